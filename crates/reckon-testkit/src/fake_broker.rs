//! Scripted exchange.
//!
//! Each path has a queue of steps consumed one per request. An exhausted
//! queue answers with an empty page, which ends a fetch pass.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reckon_broker::{BrokerClient, BrokerError};
use serde::Serialize;
use serde_json::Value;

pub enum Step {
    Page(Vec<Value>),
    Fail(BrokerError),
    /// Never answers; only a caller deadline ends the request.
    Hang,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Call {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
pub struct FakeBroker {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, path: &str, step: Step) -> &Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .push_back(step);
        self
    }

    /// Queue one page of records.
    pub fn page<T: Serialize>(&self, path: &str, records: &[T]) -> &Self {
        self.script(path, Step::Page(to_values(records)))
    }

    pub fn fail(&self, path: &str, err: BrokerError) -> &Self {
        self.script(path, Step::Fail(err))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }
}

/// Serialize wire records the way the exchange would send them.
pub fn to_values<T: Serialize>(records: &[T]) -> Vec<Value> {
    records
        .iter()
        .filter_map(|r| serde_json::to_value(r).ok())
        .collect()
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn get_page(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Value>, BrokerError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call {
                path: path.to_string(),
                query: query.to_vec(),
            });

        let step = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(path)
            .and_then(VecDeque::pop_front);

        match step {
            None => Ok(Vec::new()),
            Some(Step::Page(values)) => Ok(values),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => std::future::pending().await,
        }
    }
}
