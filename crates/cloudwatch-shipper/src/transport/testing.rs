//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::buffer::EventBatch;
use crate::transport::factory::TransportFactory;
use crate::transport::{LogsTransport, PutOutcome, SequenceToken, TransportError};

#[derive(Default)]
struct RecordingState {
    put_results: VecDeque<Result<PutOutcome, TransportError>>,
    fetch_results: VecDeque<Result<Option<SequenceToken>, TransportError>>,
    create_results: VecDeque<Result<(), TransportError>>,
    probe_results: VecDeque<Result<(), TransportError>>,
    simulate_results: VecDeque<Result<Option<String>, TransportError>>,
    put_tokens: Vec<Option<String>>,
    put_messages: Vec<Vec<String>>,
    fetch_calls: usize,
    create_calls: usize,
    probe_limits: Vec<i32>,
    simulate_calls: usize,
}

/// Transport whose remote behavior is scripted per call.
///
/// Unscripted calls succeed: puts return `token-N` for the N-th put, token
/// fetches return `fetched-token`, probes and stream creation succeed, and
/// the policy simulation reports no restriction.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    state: Mutex<RecordingState>,
}

impl RecordingTransport {
    pub(crate) fn script_put(&self, result: Result<PutOutcome, TransportError>) {
        self.state.lock().unwrap().put_results.push_back(result);
    }

    pub(crate) fn script_fetch(&self, result: Result<Option<SequenceToken>, TransportError>) {
        self.state.lock().unwrap().fetch_results.push_back(result);
    }

    pub(crate) fn script_probe(&self, result: Result<(), TransportError>) {
        self.state.lock().unwrap().probe_results.push_back(result);
    }

    pub(crate) fn script_simulate(&self, result: Result<Option<String>, TransportError>) {
        self.state.lock().unwrap().simulate_results.push_back(result);
    }

    pub(crate) fn put_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().put_tokens.clone()
    }

    pub(crate) fn put_messages(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().put_messages.clone()
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.state.lock().unwrap().fetch_calls
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub(crate) fn probe_limits(&self) -> Vec<i32> {
        self.state.lock().unwrap().probe_limits.clone()
    }

    pub(crate) fn simulate_calls(&self) -> usize {
        self.state.lock().unwrap().simulate_calls
    }
}

#[async_trait]
impl LogsTransport for RecordingTransport {
    async fn create_stream(&self, _group: &str, _stream: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        state.create_results.pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_sequence_token(
        &self,
        _group: &str,
        _stream: &str,
    ) -> Result<Option<SequenceToken>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;
        state
            .fetch_results
            .pop_front()
            .unwrap_or(Ok(Some("fetched-token".to_string())))
    }

    async fn put_events(
        &self,
        _group: &str,
        _stream: &str,
        token: Option<&str>,
        batch: &EventBatch,
    ) -> Result<PutOutcome, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.put_tokens.push(token.map(str::to_string));
        state
            .put_messages
            .push(batch.events().iter().map(|e| e.message.clone()).collect());
        let call = state.put_tokens.len();
        state.put_results.pop_front().unwrap_or(Ok(PutOutcome {
            next_token: Some(format!("token-{call}")),
            rejected_events: 0,
        }))
    }

    async fn probe_read(&self, _group: &str, limit: i32) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.probe_limits.push(limit);
        state.probe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn simulate_write_policy(&self, _group: &str) -> Result<Option<String>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.simulate_calls += 1;
        state.simulate_results.pop_front().unwrap_or(Ok(None))
    }
}

/// Factory handing out a shared [`RecordingTransport`], or a scripted
/// connect failure.
pub(crate) struct RecordingFactory {
    transport: Arc<RecordingTransport>,
    connect_error: Mutex<Option<TransportError>>,
    connects: Mutex<usize>,
}

impl RecordingFactory {
    pub(crate) fn new(transport: Arc<RecordingTransport>) -> Self {
        RecordingFactory {
            transport,
            connect_error: Mutex::new(None),
            connects: Mutex::new(0),
        }
    }

    pub(crate) fn fail_connect(&self, err: TransportError) {
        *self.connect_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }
}

#[async_trait]
impl TransportFactory for RecordingFactory {
    async fn connect(
        &self,
        _region: Option<&str>,
        _credentials_id: Option<&str>,
    ) -> Result<Arc<dyn LogsTransport>, TransportError> {
        *self.connects.lock().unwrap() += 1;
        if let Some(err) = self.connect_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(Arc::clone(&self.transport) as Arc<dyn LogsTransport>)
    }
}
