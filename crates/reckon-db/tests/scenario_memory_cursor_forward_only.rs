//! In-memory cursor store
//!
//! # Behavior under test
//! - the first save creates the cursor;
//! - a higher value advances it;
//! - a lower value, as written by a slower concurrent pass, is ignored;
//! - cursors of different feeds are independent.

use reckon_db::{Cursor, CursorStore, MemoryStore};

#[tokio::test]
async fn older_cursor_save_does_not_rewind_the_stored_one() {
    let store = MemoryStore::new();
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), None);

    store.save_cursor(Cursor::AuditOrder, 120).await.unwrap();
    store.save_cursor(Cursor::AuditOrder, 180).await.unwrap();
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), Some(180));

    store.save_cursor(Cursor::AuditOrder, 140).await.unwrap();
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), Some(180));

    store.save_cursor(Cursor::AuditStops, 7).await.unwrap();
    assert_eq!(store.load_cursor(Cursor::AuditStops).await.unwrap(), Some(7));
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), Some(180));
}
