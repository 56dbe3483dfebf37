//! Shared test support: a recording storage engine.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pgvault::{Result, Row, StorageEngine, Value, VaultError};
use tokio::sync::Semaphore;

/// A [`StorageEngine`] that records every call and serves canned responses.
///
/// Queries answer from the queued responses first; an INSERT with no queued
/// response echoes the bound parameters back as a row, standing in for
/// `RETURNING` so encryption round-trips can be observed end to end.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
    fail_batch: bool,
    started: Option<Arc<Semaphore>>,
    release: Option<Arc<Semaphore>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose `batch_execute` always fails.
    pub fn with_failing_batch() -> Self {
        Self {
            fail_batch: true,
            ..Self::default()
        }
    }

    /// Engine whose `batch_execute` signals `started` and then waits for a
    /// permit on `release`, letting tests hold an initialization in flight.
    pub fn with_gate(started: Arc<Semaphore>, release: Arc<Semaphore>) -> Self {
        Self {
            started: Some(started),
            release: Some(release),
            ..Self::default()
        }
    }

    /// Queue rows for the next query.
    pub fn push_response(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    /// Snapshot of every `(sql, params)` call so far, including batches.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls recorded so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageEngine for RecordingEngine {
    async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), Vec::new()));
        if self.fail_batch {
            return Err(VaultError::Operation {
                table: "mock".to_string(),
                message: "batch failed".to_string(),
            });
        }
        if let Some(started) = &self.started {
            started.add_permits(1);
        }
        if let Some(release) = &self.release {
            let permit = release.acquire().await.map_err(|_| VaultError::Operation {
                table: "mock".to_string(),
                message: "gate closed".to_string(),
            })?;
            permit.forget();
        }
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        if let Some(rows) = self.responses.lock().unwrap().pop_front() {
            return Ok(rows);
        }
        if sql.starts_with("INSERT INTO") {
            return Ok(vec![echo_insert(sql, params)]);
        }
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(0)
    }

    async fn close(&self) {}
}

/// Zip the column list of an INSERT with its parameters, imitating
/// `RETURNING` with what storage would now hold.
fn echo_insert(sql: &str, params: &[Value]) -> Row {
    let Some(open) = sql.find('(') else {
        return Row::new();
    };
    let Some(close) = sql[open..].find(')') else {
        return Row::new();
    };
    sql[open + 1..open + close]
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .zip(params.iter().cloned())
        .collect()
}
