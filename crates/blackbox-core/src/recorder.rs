//! The recorder: the verifying consumer in front of the audit store.
//!
//! The recorder owns two inbound channels and runs as its own tokio task:
//!
//!   sleep → drain events → [verify_event] → AuditStore → poll control → repeat
//!
//! The security invariant is absolute: nothing reaches the store unless it
//! decoded as an `Event`, carries a non-empty signature and that signature
//! verifies against the configured public key. This is enforced
//! structurally: the code path to the store is only reachable after all
//! three checks pass.
//!
//! Producers hold channel senders and nothing else, so a producer that is
//! later compromised cannot touch records the recorder already accepted.
//! A bad item is dropped with a diagnostic and never stops the loop; a
//! failing store does stop it, and the error is handed to the supervisor
//! through the task's join handle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use blackbox_contracts::{
    error::{BlackBoxError, BlackBoxResult},
    event::{ChannelMessage, ControlEvent, Event, LOG_EVENT, LOG_MESSAGE},
};
use blackbox_signing::{verify_event, PublicKey};

use crate::{config::RecorderConfig, queues::QueueDirectory, stop::StopToken, traits::AuditStore};

/// Well-known name of the recorder's event channel.
pub const EVENTS_QUEUE_NAME: &str = "black_box";

/// Default pause between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tracing target for security diagnostics.
pub const SECURITY_TARGET: &str = "security";

/// Lifecycle of a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Constructed, loop not started.
    Idle,
    /// Loop active.
    Running,
    /// Stop requested; the current cycle is finishing.
    Stopping,
    /// Loop exited.
    Terminated,
}

impl RecorderState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RecorderState::Idle,
            1 => RecorderState::Running,
            2 => RecorderState::Stopping,
            _ => RecorderState::Terminated,
        }
    }
}

/// State shared between the recorder task and its handle.
#[derive(Debug, Clone, Default)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn get(&self) -> RecorderState {
        RecorderState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: RecorderState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `Running` to `Stopping`; leave any other state alone.
    fn begin_stop(&self) {
        let _ = self.0.compare_exchange(
            RecorderState::Running as u8,
            RecorderState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Counters describing what a recorder did with its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Completed poll cycles.
    pub cycles: u64,
    /// Events appended as event records.
    pub events_logged: u64,
    /// Events appended as message records.
    pub messages_logged: u64,
    /// Dropped: no signature.
    pub unsigned: u64,
    /// Dropped: signature did not verify.
    pub invalid: u64,
    /// Dropped: not an event, or a message without text.
    pub malformed: u64,
    /// Dropped: verified, but the operation is not one the recorder handles.
    pub unknown_operation: u64,
}

impl RecorderStats {
    pub fn accepted(&self) -> u64 {
        self.events_logged + self.messages_logged
    }

    pub fn dropped(&self) -> u64 {
        self.unsigned + self.invalid + self.malformed + self.unknown_operation
    }
}

/// The verifying event consumer.
///
/// Construct one per store; `spawn()` it onto the runtime, or drive it with
/// `run()` directly.
pub struct Recorder<S: AuditStore> {
    store: S,
    public_key: PublicKey,
    directory: QueueDirectory,
    events_queue: String,
    events_rx: UnboundedReceiver<ChannelMessage>,
    control_tx: UnboundedSender<ChannelMessage>,
    control_rx: UnboundedReceiver<ChannelMessage>,
    poll_interval: Duration,
    stop: StopToken,
    state: StateCell,
    stats: RecorderStats,
}

impl<S: AuditStore> Recorder<S> {
    /// Create a recorder and register its event channel in `directory` under
    /// `EVENTS_QUEUE_NAME`.
    ///
    /// Fails with `Configuration` if that name is already registered.
    pub fn new(store: S, public_key: PublicKey, directory: &QueueDirectory) -> BlackBoxResult<Self> {
        Self::with_queue_name(store, public_key, directory, EVENTS_QUEUE_NAME)
    }

    /// Create a recorder from `config`: its queue name and poll interval.
    pub fn from_config(
        store: S,
        public_key: PublicKey,
        directory: &QueueDirectory,
        config: &RecorderConfig,
    ) -> BlackBoxResult<Self> {
        Ok(Self::with_queue_name(store, public_key, directory, &config.events_queue)?
            .with_poll_interval(config.poll_interval()))
    }

    fn with_queue_name(
        store: S,
        public_key: PublicKey,
        directory: &QueueDirectory,
        events_queue: &str,
    ) -> BlackBoxResult<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        directory.register(events_queue, events_tx)?;

        Ok(Self {
            store,
            public_key,
            directory: directory.clone(),
            events_queue: events_queue.to_string(),
            events_rx,
            control_tx,
            control_rx,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop: StopToken::new(),
            state: StateCell::default(),
            stats: RecorderStats::default(),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Observe `stop` instead of a private token.
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Sender for the control channel.
    pub fn control_sender(&self) -> UnboundedSender<ChannelMessage> {
        self.control_tx.clone()
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }

    /// Raise the stop flag directly, bypassing the control channel.
    pub fn stop(&self) {
        self.stop.stop();
        self.state.begin_stop();
    }

    /// Drain the event channel without blocking.
    ///
    /// Returns the number of items handled. Dropped items count; only store
    /// failures are errors.
    pub fn poll_events(&mut self) -> BlackBoxResult<usize> {
        let mut handled = 0;
        loop {
            let message = match self.events_rx.try_recv() {
                Ok(message) => message,
                // Nothing queued, or every sender is gone: either way the
                // channel has nothing more for this cycle.
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            handled += 1;

            match message.into_event() {
                Ok(event) => self.handle_event(event)?,
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(target: SECURITY_TARGET, error = %e, "dropping malformed item from event channel");
                }
            }
        }
        Ok(handled)
    }

    /// Drain the control channel without blocking; a `stop` raises the flag.
    pub fn poll_control(&mut self) {
        while let Ok(message) = self.control_rx.try_recv() {
            match message.into_control() {
                Ok(control) => self.handle_control(&control),
                Err(e) => {
                    debug!(target: SECURITY_TARGET, error = %e, "ignoring malformed control message");
                }
            }
        }
    }

    fn handle_control(&self, control: &ControlEvent) {
        debug!(target: SECURITY_TARGET, operation = %control.operation, "control request");
        if control.is_stop() {
            info!(target: SECURITY_TARGET, "stop requested via control channel");
            self.stop();
        }
    }

    fn handle_event(&mut self, event: Event) -> BlackBoxResult<()> {
        debug!(
            target: SECURITY_TARGET,
            source = %event.source,
            operation = %event.operation,
            "event received"
        );

        // ── Gate 1: a signature must be present ──────────────────────────────
        if !event.is_signed() {
            self.stats.unsigned += 1;
            warn!(
                target: SECURITY_TARGET,
                source = %event.source,
                operation = %event.operation,
                "dropping unsigned event"
            );
            return Ok(());
        }

        // ── Gate 2: the signature must verify ────────────────────────────────
        if let Err(e) = self.check_signature(&event) {
            self.stats.invalid += 1;
            warn!(
                target: SECURITY_TARGET,
                source = %event.source,
                operation = %event.operation,
                error = %e,
                "dropping event"
            );
            return Ok(());
        }

        // ── Dispatch: only verified events reach the store ───────────────────
        match event.operation.as_str() {
            LOG_EVENT => {
                info!(target: SECURITY_TARGET, source = %event.source, "logging event");
                self.store.append_event_record(&event)?;
                self.stats.events_logged += 1;
            }
            LOG_MESSAGE => match event.parameters.as_str() {
                Some(raw) => {
                    info!(target: SECURITY_TARGET, source = %event.source, "logging message");
                    self.store.append_message_record(raw)?;
                    self.stats.messages_logged += 1;
                }
                None => {
                    self.stats.malformed += 1;
                    warn!(
                        target: SECURITY_TARGET,
                        source = %event.source,
                        kind = event.parameters.kind(),
                        "dropping log_message whose parameters are not text"
                    );
                }
            },
            other => {
                self.stats.unknown_operation += 1;
                debug!(
                    target: SECURITY_TARGET,
                    source = %event.source,
                    operation = %other,
                    "dropping event with unhandled operation"
                );
            }
        }
        Ok(())
    }

    /// `VerificationFailed` unless `event` verifies against the trusted key.
    fn check_signature(&self, event: &Event) -> BlackBoxResult<()> {
        match verify_event(event, &self.public_key) {
            Ok(true) => Ok(()),
            Ok(false) => Err(BlackBoxError::VerificationFailed {
                reason: format!("signature does not match key {}", self.public_key.fingerprint()),
            }),
            Err(e) => Err(BlackBoxError::VerificationFailed {
                reason: format!("signed payload cannot be reconstructed: {}", e),
            }),
        }
    }

    /// Run the poll loop until stopped or the store fails.
    ///
    /// Each cycle sleeps one poll interval, drains the event channel, then
    /// drains the control channel. The stop flag is checked at the top of
    /// every cycle, so a stop takes effect within one interval and never
    /// interrupts an append.
    pub async fn run(mut self) -> BlackBoxResult<RecorderStats> {
        self.state.set(RecorderState::Running);
        info!(
            target: SECURITY_TARGET,
            queue = %self.events_queue,
            key = %self.public_key.fingerprint(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "recorder started"
        );

        let outcome = loop {
            if self.stop.is_stopped() {
                self.state.begin_stop();
                break Ok(());
            }

            tokio::time::sleep(self.poll_interval).await;

            if let Err(e) = self.poll_events() {
                warn!(target: SECURITY_TARGET, error = %e, "store failure; recorder stopping");
                break Err(e);
            }
            self.poll_control();
            self.stats.cycles += 1;
        };

        self.state.set(RecorderState::Terminated);
        info!(
            target: SECURITY_TARGET,
            cycles = self.stats.cycles,
            accepted = self.stats.accepted(),
            dropped = self.stats.dropped(),
            "recorder terminated"
        );

        let stats = std::mem::take(&mut self.stats);
        outcome.map(|()| stats)
    }
}

impl<S: AuditStore> Drop for Recorder<S> {
    /// Release the queue name whether or not the loop ever ran.
    fn drop(&mut self) {
        self.directory.unregister(&self.events_queue);
    }
}

impl<S: AuditStore + 'static> Recorder<S> {
    /// Start the loop as an independent tokio task.
    pub fn spawn(self) -> RecorderHandle {
        let handle = RecorderHandle {
            stop: self.stop.clone(),
            control_tx: self.control_tx.clone(),
            state: self.state.clone(),
            join: None,
        };
        // Mark running before the task is scheduled so callers never observe
        // `Idle` after `spawn` returns.
        self.state.set(RecorderState::Running);
        RecorderHandle {
            join: Some(tokio::spawn(self.run())),
            ..handle
        }
    }
}

/// Supervisor's view of a spawned recorder.
pub struct RecorderHandle {
    stop: StopToken,
    control_tx: UnboundedSender<ChannelMessage>,
    state: StateCell,
    join: Option<JoinHandle<BlackBoxResult<RecorderStats>>>,
}

impl RecorderHandle {
    /// Raise the stop flag directly.
    pub fn stop(&self) {
        self.stop.stop();
        self.state.begin_stop();
    }

    /// Send a control event through the control channel.
    pub fn send_control(&self, control: ControlEvent) -> BlackBoxResult<()> {
        self.control_tx
            .send(ChannelMessage::Control(control))
            .map_err(|_| BlackBoxError::RecorderTerminated {
                reason: "control channel is closed".to_string(),
            })
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Wait for the task to exit and return its final stats.
    pub async fn join(mut self) -> BlackBoxResult<RecorderStats> {
        let join = self.join.take().ok_or_else(|| BlackBoxError::RecorderTerminated {
            reason: "recorder task already joined".to_string(),
        })?;
        join.await.map_err(|e| BlackBoxError::RecorderTerminated {
            reason: format!("recorder task failed: {}", e),
        })?
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use blackbox_contracts::{
        error::{BlackBoxError, BlackBoxResult},
        event::{ChannelMessage, ControlEvent, Event, LOG_EVENT, LOG_MESSAGE},
        value::Value,
    };
    use blackbox_signing::{signed_event, verify_value, PrivateKey, PublicKey};

    use crate::{
        producer::Producer, queues::QueueDirectory, stop::StopToken, traits::AuditStore,
    };

    use super::{Recorder, RecorderHandle, RecorderState, EVENTS_QUEUE_NAME};

    // ── Mock helpers ─────────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum Appended {
        Event(Event),
        Message(String),
    }

    /// A store that records every append for later inspection.
    #[derive(Clone, Default)]
    struct MockStore {
        appended: Arc<Mutex<Vec<Appended>>>,
    }

    impl MockStore {
        fn appended(&self) -> Vec<Appended> {
            self.appended.lock().unwrap().clone()
        }
    }

    impl AuditStore for MockStore {
        fn append_event_record(&self, event: &Event) -> BlackBoxResult<bool> {
            self.appended.lock().unwrap().push(Appended::Event(event.clone()));
            Ok(true)
        }

        fn append_message_record(&self, raw: &str) -> BlackBoxResult<bool> {
            self.appended.lock().unwrap().push(Appended::Message(raw.to_string()));
            Ok(true)
        }
    }

    /// A store whose writes always fail.
    struct FailingStore;

    impl AuditStore for FailingStore {
        fn append_event_record(&self, _event: &Event) -> BlackBoxResult<bool> {
            Err(BlackBoxError::Persistence {
                path: "/dev/full".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }

        fn append_message_record(&self, _raw: &str) -> BlackBoxResult<bool> {
            Err(BlackBoxError::missing_public_key())
        }
    }

    fn producer_key() -> PrivateKey {
        PrivateKey::from_seed([7u8; 32])
    }

    fn trusted_key() -> PublicKey {
        producer_key().public_key()
    }

    fn log_event(params: serde_json::Value) -> Event {
        Event::new("svc", "mgr", LOG_EVENT, params)
    }

    fn signed(event: Event) -> Event {
        signed_event(event, &producer_key()).unwrap()
    }

    fn recorder(store: MockStore) -> (Recorder<MockStore>, QueueDirectory) {
        let directory = QueueDirectory::new();
        let recorder = Recorder::new(store, trusted_key(), &directory)
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));
        (recorder, directory)
    }

    fn enqueue(directory: &QueueDirectory, message: impl Into<ChannelMessage>) {
        directory.get(EVENTS_QUEUE_NAME).unwrap().send(message.into()).unwrap();
    }

    // ── Verification gate ────────────────────────────────────────────────────

    #[test]
    fn test_valid_event_reaches_store() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let event = signed(log_event(json!({ "id": 7 })));
        enqueue(&directory, event.clone());

        assert_eq!(recorder.poll_events().unwrap(), 1);
        assert_eq!(store.appended(), vec![Appended::Event(event)]);
        assert_eq!(recorder.stats().events_logged, 1);
    }

    #[test]
    fn test_unsigned_event_never_reaches_store() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        enqueue(&directory, log_event(json!({ "id": 1 })));
        let mut empty = log_event(json!({ "id": 2 }));
        empty.signature = Some(String::new());
        enqueue(&directory, empty);

        recorder.poll_events().unwrap();
        assert!(store.appended().is_empty());
        assert_eq!(recorder.stats().unsigned, 2);
    }

    #[test]
    fn test_wrong_key_and_tampered_events_dropped() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let foreign = signed_event(log_event(json!({ "id": 1 })), &PrivateKey::from_seed([9u8; 32]))
            .unwrap();
        enqueue(&directory, foreign);

        let mut tampered = signed(log_event(json!({ "id": 2 })));
        tampered.parameters = Value::from(json!({ "id": 3 }));
        enqueue(&directory, tampered);

        let mut garbled = signed(log_event(json!({ "id": 4 })));
        garbled.signature = Some("not base64 at all!".to_string());
        enqueue(&directory, garbled);

        recorder.poll_events().unwrap();
        assert!(store.appended().is_empty());
        assert_eq!(recorder.stats().invalid, 3);
    }

    /// A dropped item must not affect anything queued behind it.
    #[test]
    fn test_loop_continues_after_rejected_events() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        enqueue(&directory, log_event(json!({ "id": 1 })));
        let mut tampered = signed(log_event(json!({ "id": 2 })));
        tampered.source = "intruder".to_string();
        enqueue(&directory, tampered);
        let good = signed(log_event(json!({ "id": 3 })));
        enqueue(&directory, good.clone());

        assert_eq!(recorder.poll_events().unwrap(), 3);
        assert_eq!(store.appended(), vec![Appended::Event(good)]);
        assert_eq!(recorder.stats().dropped(), 2);
    }

    #[test]
    fn test_events_appended_in_fifo_order() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let events: Vec<Event> = (0..20).map(|i| signed(log_event(json!({ "seq": i })))).collect();
        for event in &events {
            enqueue(&directory, event.clone());
        }
        recorder.poll_events().unwrap();

        let expected: Vec<Appended> = events.into_iter().map(Appended::Event).collect();
        assert_eq!(store.appended(), expected);
    }

    #[test]
    fn test_wire_bytes_decoded_or_dropped() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let event = signed(log_event(json!({ "id": 7 })));
        enqueue(&directory, ChannelMessage::Wire(serde_json::to_vec(&event).unwrap()));
        enqueue(&directory, ChannelMessage::Wire(b"\x00\xffnot json".to_vec()));
        enqueue(&directory, ControlEvent::stop());

        recorder.poll_events().unwrap();
        assert_eq!(store.appended(), vec![Appended::Event(event)]);
        assert_eq!(recorder.stats().malformed, 2);
        // A stop on the event channel is not a stop request.
        assert!(!recorder.stop_token().is_stopped());
    }

    /// Floats must survive the wire exactly or the signature stops matching.
    #[test]
    fn test_wire_float_payload_still_verifies() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let event = signed(Event::new("svc", "mgr", LOG_EVENT, Value::Float(2.291712365432881e-9)));
        enqueue(&directory, ChannelMessage::Wire(serde_json::to_vec(&event).unwrap()));

        recorder.poll_events().unwrap();
        assert_eq!(store.appended(), vec![Appended::Event(event)]);
        assert_eq!(recorder.stats().invalid, 0);
    }

    #[test]
    fn test_rejection_reason_is_verification_failure() {
        let (recorder, _directory) = recorder(MockStore::default());

        let mut tampered = signed(
            log_event(json!({ "id": 1 })).with_extra_parameters(json!({ "shift": "night" })),
        );
        tampered.extra_parameters = Value::from(json!({ "shift": "day" }));
        let err = recorder.check_signature(&tampered).unwrap_err();
        assert!(matches!(err, BlackBoxError::VerificationFailed { .. }));

        let untampered = signed(
            log_event(json!({ "id": 2 })).with_extra_parameters(json!({ "shift": "night" })),
        );
        assert!(recorder.check_signature(&untampered).is_ok());
    }

    /// A pathologically deep in-process payload is rejected and released
    /// without exhausting the stack.
    #[test]
    fn test_deeply_nested_payload_dropped_without_crash() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let mut nested = Value::Null;
        for _ in 0..200_000 {
            nested = Value::List(vec![nested]);
        }
        let mut event = Event::new("svc", "mgr", LOG_EVENT, nested);
        event.signature = Some("AAAA".to_string());
        enqueue(&directory, event);
        enqueue(&directory, signed(log_event(json!({ "id": 1 }))));

        assert_eq!(recorder.poll_events().unwrap(), 2);
        assert_eq!(recorder.stats().invalid, 1);
        assert_eq!(store.appended().len(), 1);
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    #[test]
    fn test_log_message_passes_raw_text() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let event = signed(Event::new("svc", "mgr", LOG_MESSAGE, "c2lnbmF0dXJl hello world"));
        enqueue(&directory, event);

        recorder.poll_events().unwrap();
        assert_eq!(
            store.appended(),
            vec![Appended::Message("c2lnbmF0dXJl hello world".to_string())]
        );
        assert_eq!(recorder.stats().messages_logged, 1);
    }

    #[test]
    fn test_log_message_with_structured_parameters_dropped() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        enqueue(&directory, signed(Event::new("svc", "mgr", LOG_MESSAGE, json!({ "text": "hi" }))));
        recorder.poll_events().unwrap();

        assert!(store.appended().is_empty());
        assert_eq!(recorder.stats().malformed, 1);
    }

    #[test]
    fn test_unknown_operation_dropped() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        enqueue(&directory, signed(Event::new("svc", "mgr", "erase_log", json!({}))));
        recorder.poll_events().unwrap();

        assert!(store.appended().is_empty());
        assert_eq!(recorder.stats().unknown_operation, 1);
    }

    #[test]
    fn test_producer_log_message_signature_verifies() {
        let store = MockStore::default();
        let (mut recorder, directory) = recorder(store.clone());

        let producer = Producer::connect("svc", producer_key(), &directory, EVENTS_QUEUE_NAME).unwrap();
        assert_eq!(producer.name(), "svc");
        producer.log_message("mgr", "door opened at gate 4").unwrap();
        recorder.poll_events().unwrap();

        let appended = store.appended();
        let Some(Appended::Message(raw)) = appended.first() else {
            panic!("expected one message record, got {:?}", appended);
        };
        let (signature, message) = raw.split_once(' ').unwrap();
        assert_eq!(message, "door opened at gate 4");
        assert!(verify_value(message, signature, &trusted_key()).unwrap());
    }

    #[test]
    fn test_store_failure_propagates() {
        let directory = QueueDirectory::new();
        let mut recorder = Recorder::new(FailingStore, trusted_key(), &directory).unwrap();

        enqueue(&directory, signed(log_event(json!({ "id": 1 }))));
        let err = recorder.poll_events().unwrap_err();
        assert!(matches!(err, BlackBoxError::Persistence { .. }));
    }

    // ── Queue directory ──────────────────────────────────────────────────────

    #[test]
    fn test_duplicate_queue_registration_rejected() {
        let directory = QueueDirectory::new();
        let _first = Recorder::new(MockStore::default(), trusted_key(), &directory).unwrap();

        let second = Recorder::new(MockStore::default(), trusted_key(), &directory);
        assert!(matches!(second, Err(BlackBoxError::Configuration { .. })));
    }

    #[test]
    fn test_unstarted_recorder_releases_queue_on_drop() {
        let directory = QueueDirectory::new();
        let first = Recorder::new(MockStore::default(), trusted_key(), &directory).unwrap();
        drop(first);

        assert!(directory.get(EVENTS_QUEUE_NAME).is_none());
        assert!(Recorder::new(MockStore::default(), trusted_key(), &directory).is_ok());
    }

    #[test]
    fn test_connect_to_unregistered_queue_fails() {
        let directory = QueueDirectory::new();
        let result = Producer::connect("svc", producer_key(), &directory, EVENTS_QUEUE_NAME);
        assert!(matches!(result, Err(BlackBoxError::Configuration { .. })));
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    #[test]
    fn test_control_stop_raises_flag() {
        let (mut recorder, _directory) = recorder(MockStore::default());
        recorder
            .control_sender()
            .send(ChannelMessage::Control(ControlEvent::new("status")))
            .unwrap();
        recorder.poll_control();
        assert!(!recorder.stop_token().is_stopped());

        recorder.control_sender().send(ControlEvent::stop().into()).unwrap();
        recorder.poll_control();
        assert!(recorder.stop_token().is_stopped());
    }

    #[tokio::test]
    async fn test_spawned_recorder_stops_via_control_channel() {
        let store = MockStore::default();
        let (recorder, directory) = recorder(store.clone());
        let handle = recorder.spawn();
        assert_eq!(handle.state(), RecorderState::Running);

        let producer = Producer::connect("svc", producer_key(), &directory, EVENTS_QUEUE_NAME).unwrap();
        producer.log_event("mgr", json!({ "id": 7 })).unwrap();
        handle.send_control(ControlEvent::stop()).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("recorder did not stop")
            .unwrap();
        assert_eq!(stats.events_logged, 1);
        assert_eq!(store.appended().len(), 1);

        // The queue name is released on termination.
        assert!(directory.get(EVENTS_QUEUE_NAME).is_none());
        assert!(producer.log_event("mgr", json!({ "id": 8 })).is_err());
    }

    #[tokio::test]
    async fn test_direct_stop_terminates() {
        let token = StopToken::new();
        let (recorder, _directory) = recorder(MockStore::default());
        let handle = recorder.with_stop_token(token.clone()).spawn();

        token.stop();
        assert_ne!(handle.state(), RecorderState::Idle);

        let stats = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("recorder did not stop")
            .unwrap();
        assert_eq!(stats.accepted(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_ends_run() {
        let directory = QueueDirectory::new();
        let recorder = Recorder::new(FailingStore, trusted_key(), &directory)
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));
        enqueue(&directory, signed(log_event(json!({ "id": 1 }))));

        let result = tokio::time::timeout(Duration::from_secs(5), recorder.run())
            .await
            .expect("recorder did not exit");
        assert!(matches!(result, Err(BlackBoxError::Persistence { .. })));
        assert!(directory.get(EVENTS_QUEUE_NAME).is_none());
    }

    #[tokio::test]
    async fn test_handle_state_terminated_after_join() {
        let (recorder, _directory) = recorder(MockStore::default());
        let handle = recorder.spawn();
        let state = handle.state.clone();
        handle.stop();

        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("recorder did not stop")
            .unwrap();
        assert_eq!(state.get(), RecorderState::Terminated);
    }

    // ── Stop responsiveness ──────────────────────────────────────────────────

    const INTERVAL: Duration = Duration::from_millis(100);

    fn spawn_with_interval(store: MockStore) -> (RecorderHandle, QueueDirectory) {
        let directory = QueueDirectory::new();
        let handle = Recorder::new(store, trusted_key(), &directory)
            .unwrap()
            .with_poll_interval(INTERVAL)
            .spawn();
        (handle, directory)
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_stop_honoured_within_one_interval() {
        let store = MockStore::default();
        let (handle, directory) = spawn_with_interval(store.clone());

        enqueue(&directory, signed(log_event(json!({ "id": 1 }))));
        let stopped_at = Instant::now();
        handle.send_control(ControlEvent::stop()).unwrap();

        let stats = handle.join().await.unwrap();
        let elapsed = stopped_at.elapsed();
        assert!(elapsed < INTERVAL + INTERVAL / 2, "took {:?} to stop", elapsed);

        // Queued ahead of the stop, so it is still appended.
        assert_eq!(stats.events_logged, 1);
        assert_eq!(store.appended().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_stop_honoured_within_one_interval() {
        let store = MockStore::default();
        let (handle, directory) = spawn_with_interval(store.clone());

        enqueue(&directory, signed(log_event(json!({ "id": 1 }))));
        tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(store.appended().len(), 1);

        let stopped_at = Instant::now();
        handle.stop();
        assert!(!handle.is_finished());

        let stats = handle.join().await.unwrap();
        let elapsed = stopped_at.elapsed();
        assert!(elapsed < INTERVAL + INTERVAL / 2, "took {:?} to stop", elapsed);
        assert_eq!(stats.events_logged, 1);
    }
}
