use super::*;
use crate::config::NotificationConfig;
use crate::error::{QueueError, TransportError, TransportStep};
use crate::transport::{ByteProgress, HttpTransport, ProgressSender, UploadRequest};
use crate::types::{BatchSummary, FailureKind, NotificationKind, TaskOutcome};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Responder = dyn Fn(&UploadRequest) -> std::result::Result<Value, TransportError> + Send + Sync;

/// In-process transport with scripted responses and an optional gate that
/// holds uploads until released
struct MockTransport {
    respond: Box<Responder>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    uploads: StdMutex<Vec<String>>,
}

impl MockTransport {
    fn new<F>(respond: F) -> Self
    where
        F: Fn(&UploadRequest) -> std::result::Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            uploads: StdMutex::new(Vec::new()),
        }
    }

    fn ok() -> Self {
        Self::new(|_| Ok(json!({"imported": 1})))
    }

    /// Hold every upload until [`release`](Self::release)
    fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn create_job(
        &self,
        _create_path: &str,
        _document_type: DocumentType,
        _file_name: &str,
    ) -> std::result::Result<String, TransportError> {
        Ok("job-1".to_string())
    }

    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressSender,
    ) -> std::result::Result<Value, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.uploads.lock().unwrap().push(request.file_name.clone());

        let total = request.content.len() as u64;
        for loaded in [total / 4, total / 2, total] {
            let _ = progress.send(ByteProgress { loaded, total });
        }

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(&request)
    }
}

fn queue_with(
    transport: Arc<dyn Transport>,
    max_concurrent_uploads: usize,
) -> (UploadQueue, broadcast::Receiver<Event>) {
    let (event_tx, event_rx) = broadcast::channel(1000);
    let notifications = NotificationFeed::new(
        NotificationConfig {
            ttl: Duration::from_secs(60),
            capacity: 100,
        },
        event_tx.clone(),
    );
    let config = UploadConfig {
        max_concurrent_uploads,
        ..Default::default()
    };
    (
        UploadQueue::new(&config, transport, notifications, event_tx),
        event_rx,
    )
}

fn http_queue(server: &MockServer) -> (UploadQueue, broadcast::Receiver<Event>) {
    let config = UploadConfig {
        base_url: server.uri(),
        chunk_size: 8,
        ..Default::default()
    };
    let transport = HttpTransport::new(&config).unwrap();
    queue_with(Arc::new(transport), 4)
}

fn pdf(name: &str, document_type: DocumentType) -> SubmitRequest {
    SubmitRequest::new(name, vec![b'x'; 100], document_type)
}

/// Poll `check` until it holds, failing the test after 5 seconds
async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Collect events for `id` up to and including its terminal event
async fn events_until_terminal(rx: &mut broadcast::Receiver<Event>, id: TaskId) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap();
        if event.task_id() != Some(id) || matches!(event, Event::Notified { .. }) {
            continue;
        }
        let terminal = matches!(event, Event::TaskCompleted { .. } | Event::TaskFailed { .. });
        events.push(event);
        if terminal {
            return events;
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_submit_returns_pending_task_immediately() {
    let transport = Arc::new(MockTransport::ok().gated());
    let (queue, _rx) = queue_with(transport.clone(), 4);

    let handle = queue
        .submit(pdf("F24_2024.pdf", DocumentType::TaxForm))
        .await
        .unwrap();

    let task = queue.get(handle.id()).await.unwrap();
    assert!(task.status.is_active());
    assert_eq!(task.endpoint, "/api/tax-forms/import");
    assert_eq!(task.size_bytes, 100);
    assert!(queue.has_active_uploads().await);

    transport.release(1);
    assert!(matches!(handle.outcome().await, TaskOutcome::Completed(_)));
}

#[tokio::test]
async fn test_successful_upload_event_sequence_and_progress() {
    let (queue, mut rx) = queue_with(Arc::new(MockTransport::ok()), 4);

    let handle = queue
        .submit(pdf("F24_2024.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let id = handle.id();
    let outcome = handle.outcome().await;

    let events = events_until_terminal(&mut rx, id).await;
    assert!(matches!(events.first(), Some(Event::Queued { .. })));
    assert!(matches!(events.get(1), Some(Event::UploadStarted { endpoint, .. }) if endpoint == "/api/tax-forms/import"));
    assert!(matches!(events.last(), Some(Event::TaskCompleted { summary, .. }) if summary == "1 record importati"));

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.first(), Some(&10));
    assert!(percents.windows(2).all(|w| w[0] < w[1]));
    assert!(percents.iter().all(|p| (10..=90).contains(p)));

    match outcome {
        TaskOutcome::Completed(result) => {
            assert_eq!(result.summary, "1 record importati");
            assert_eq!(result.body, json!({"imported": 1}));
        }
        other => panic!("expected Completed, got {other:?}"),
    }

    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, Status::Completed);
    assert_eq!(task.progress, 100);
    assert!(task.started_at.is_some());
    assert!(task.finished_at.is_some());
    assert!(task.error.is_none());
    assert!(!queue.has_active_uploads().await);
}

#[tokio::test]
async fn test_duplicate_and_success_are_independent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/invoices/import"))
        .and(body_string_contains("IT001_fattura_1.xml"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"detail": "esiste già"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/invoices/import"))
        .and(body_string_contains("IT001_fattura_2.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imported": 12})))
        .mount(&server)
        .await;

    let (queue, _rx) = http_queue(&server);
    let first = queue
        .submit(SubmitRequest::new(
            "IT001_fattura_1.xml",
            b"<FatturaElettronica/>".to_vec(),
            DocumentType::ElectronicInvoice,
        ))
        .await
        .unwrap();
    let second = queue
        .submit(SubmitRequest::new(
            "IT001_fattura_2.xml",
            b"<FatturaElettronica/>".to_vec(),
            DocumentType::ElectronicInvoice,
        ))
        .await
        .unwrap();
    let (first_id, second_id) = (first.id(), second.id());

    assert_eq!(
        first.outcome().await,
        TaskOutcome::Duplicate {
            message: "Duplicato (ignorato)".to_string()
        }
    );
    match second.outcome().await {
        TaskOutcome::Completed(result) => assert_eq!(result.summary, "12 record importati"),
        other => panic!("expected Completed, got {other:?}"),
    }

    let duplicate = queue.get(first_id).await.unwrap();
    assert_eq!(duplicate.status, Status::Error);
    assert_eq!(duplicate.failure, Some(FailureKind::Duplicate));
    assert_eq!(duplicate.error.as_deref(), Some("Duplicato (ignorato)"));
    assert_eq!(queue.get(second_id).await.unwrap().status, Status::Completed);

    assert_eq!(
        queue.summary().await,
        BatchSummary {
            total: 2,
            active: 0,
            completed: 1,
            duplicates: 1,
            errors: 0,
        }
    );
    assert_eq!(queue.errored().await.len(), 1);
    assert_eq!(queue.duplicates().await.len(), 1);
    assert_eq!(queue.completed().await.len(), 1);

    let notifications = queue.notifications().list().await;
    assert_eq!(notifications.len(), 2);
    let kind_for = |id| {
        notifications
            .iter()
            .find(|n| n.task_id == Some(id))
            .map(|n| n.kind)
    };
    assert_eq!(kind_for(first_id), Some(NotificationKind::Error));
    assert_eq!(kind_for(second_id), Some(NotificationKind::Success));
}

#[tokio::test]
async fn test_validation_error_is_upload_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/suppliers/import"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"detail": [{"msg": "field required"}, {"msg": "bad csv"}]})),
        )
        .mount(&server)
        .await;

    let (queue, _rx) = http_queue(&server);
    let handle = queue
        .submit(SubmitRequest::new(
            "fornitori.csv",
            b"a;b".to_vec(),
            DocumentType::SupplierRegistry,
        ))
        .await
        .unwrap();
    let id = handle.id();

    assert_eq!(
        handle.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::Upload,
            message: "field required; bad csv".to_string(),
        }
    );
    let task = queue.get(id).await.unwrap();
    assert_eq!(task.status, Status::Error);
    assert_eq!(task.failure, Some(FailureKind::Upload));
    assert!(task.progress < 100);
    assert_eq!(queue.summary().await.errors, 1);
}

#[tokio::test]
async fn test_network_failure_is_transport_failure() {
    let transport = MockTransport::new(|_| {
        Err(TransportError::Network {
            step: TransportStep::Upload,
            message: "connection refused".to_string(),
        })
    });
    let (queue, _rx) = queue_with(Arc::new(transport), 4);

    let handle = queue
        .submit(pdf("versamenti.pdf", DocumentType::CashDeposit))
        .await
        .unwrap();
    assert_eq!(
        handle.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::Transport,
            message: "connection refused".to_string(),
        }
    );
}

// ---------------------------------------------------------------------------
// Job protocol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_job_protocol_creates_job_then_uploads() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/payroll/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 314})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/payroll/jobs/314/file"))
        .and(body_string_contains("cedolini_marzo.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"created": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, mut rx) = http_queue(&server);
    let handle = queue
        .submit(pdf("cedolini_marzo.pdf", DocumentType::Payslip))
        .await
        .unwrap();
    let id = handle.id();

    match handle.outcome().await {
        TaskOutcome::Completed(result) => assert_eq!(result.summary, "7 record creati"),
        other => panic!("expected Completed, got {other:?}"),
    }

    let events = events_until_terminal(&mut rx, id).await;
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::JobCreated { job_id, .. } if job_id == "314"))
    );
    // the task keeps the template path it was resolved to
    assert_eq!(
        queue.get(id).await.unwrap().endpoint,
        "/api/payroll/jobs/{job_id}/file"
    );
}

#[tokio::test]
async fn test_job_creation_failure_skips_upload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/bank-statements/jobs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/bank-statements/jobs/1/file"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (queue, _rx) = http_queue(&server);
    let handle = queue
        .submit(pdf("estratto_conto_marzo.pdf", DocumentType::BankStatement))
        .await
        .unwrap();

    assert_eq!(
        handle.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::JobCreation,
            message: "service unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn test_job_id_is_encoded_into_upload_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/payroll/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "2024/03"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/payroll/jobs/2024%2F03/file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, _rx) = http_queue(&server);
    let handle = queue
        .submit(pdf("cedolini_marzo.pdf", DocumentType::Payslip))
        .await
        .unwrap();

    match handle.outcome().await {
        TaskOutcome::Completed(result) => assert_eq!(result.summary, "2 record elaborati"),
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dot_segment_job_id_fails_job_creation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/payroll/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"job_id": ".."})))
        .expect(1)
        .mount(&server)
        .await;

    let (queue, _rx) = http_queue(&server);
    let handle = queue
        .submit(pdf("cedolini_marzo.pdf", DocumentType::Payslip))
        .await
        .unwrap();
    let id = handle.id();

    assert!(matches!(
        handle.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::JobCreation,
            ..
        }
    ));
    // only the job creation request reached the server
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(queue.get(id).await.unwrap().status, Status::Error);
}

// ---------------------------------------------------------------------------
// Concurrency and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrency_limit_keeps_rest_pending() {
    let transport = Arc::new(MockTransport::ok().gated());
    let (queue, _rx) = queue_with(transport.clone(), 2);

    let mut handles = Vec::new();
    for i in 0..5 {
        handles.push(
            queue
                .submit(pdf(&format!("f24_{i}.pdf"), DocumentType::TaxForm))
                .await
                .unwrap(),
        );
    }

    {
        let transport = transport.clone();
        eventually(move || {
            let transport = transport.clone();
            async move { transport.in_flight() == 2 }
        })
        .await;
    }

    let tasks = queue.tasks().await;
    let uploading = tasks.iter().filter(|t| t.status == Status::Uploading).count();
    let pending = tasks.iter().filter(|t| t.status == Status::Pending).count();
    assert_eq!(uploading, 2);
    assert_eq!(pending, 3);
    assert_eq!(queue.active().await.len(), 5);

    transport.release(5);
    for handle in handles {
        assert!(matches!(handle.outcome().await, TaskOutcome::Completed(_)));
    }
    assert!(transport.max_in_flight() <= 2);
    assert_eq!(transport.uploads().len(), 5);
    assert_eq!(queue.summary().await.completed, 5);
}

#[tokio::test]
async fn test_cancel_pending_and_uploading_tasks() {
    let transport = Arc::new(MockTransport::ok().gated());
    let (queue, mut rx) = queue_with(transport.clone(), 1);

    let running = queue
        .submit(pdf("a.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let waiting = queue
        .submit(pdf("b.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let (running_id, waiting_id) = (running.id(), waiting.id());

    {
        let transport = transport.clone();
        eventually(move || {
            let transport = transport.clone();
            async move { transport.in_flight() == 1 }
        })
        .await;
    }
    assert_eq!(queue.get(waiting_id).await.unwrap().status, Status::Pending);

    queue.cancel(waiting_id).await.unwrap();
    assert_eq!(
        waiting.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::Cancelled,
            message: "Caricamento annullato".to_string(),
        }
    );

    // a queued task still passes through Uploading on its way to Error
    let events = events_until_terminal(&mut rx, waiting_id).await;
    assert!(matches!(events[0], Event::Queued { .. }), "{events:?}");
    assert!(matches!(events[1], Event::UploadStarted { .. }), "{events:?}");
    assert!(
        matches!(
            events.last(),
            Some(Event::TaskFailed {
                kind: FailureKind::Cancelled,
                ..
            })
        ),
        "{events:?}"
    );
    let waiting_task = queue.get(waiting_id).await.unwrap();
    assert!(waiting_task.started_at.is_some());
    assert!(waiting_task.finished_at.is_some());

    queue.cancel(running_id).await.unwrap();
    assert!(matches!(
        running.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        }
    ));

    for id in [running_id, waiting_id] {
        let task = queue.get(id).await.unwrap();
        assert_eq!(task.status, Status::Error);
        assert_eq!(task.failure, Some(FailureKind::Cancelled));
    }
    assert_eq!(transport.uploads(), vec!["a.pdf".to_string()]);

    // terminal tasks cannot be cancelled again
    assert!(matches!(
        queue.cancel(running_id).await,
        Err(Error::Queue(QueueError::InvalidState { .. }))
    ));
    assert!(matches!(
        queue.cancel(TaskId(999)).await,
        Err(Error::Queue(QueueError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_shutdown_cancels_and_rejects_new_submissions() {
    let transport = Arc::new(MockTransport::ok().gated());
    let (queue, _rx) = queue_with(transport.clone(), 4);

    let handle = queue
        .submit(pdf("a.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let id = handle.id();

    queue.shutdown().await.unwrap();
    assert!(!queue.is_accepting());
    assert!(matches!(
        handle.outcome().await,
        TaskOutcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        }
    ));
    assert_eq!(queue.get(id).await.unwrap().status, Status::Error);
    assert!(!queue.has_active_uploads().await);

    assert!(matches!(
        queue.submit(pdf("b.pdf", DocumentType::TaxForm)).await,
        Err(Error::ShuttingDown)
    ));
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_remove_only_terminal_tasks() {
    let transport = Arc::new(MockTransport::ok().gated());
    let (queue, mut rx) = queue_with(transport.clone(), 4);

    let handle = queue
        .submit(pdf("a.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let id = handle.id();

    assert!(matches!(
        queue.remove(id).await,
        Err(Error::Queue(QueueError::InvalidState { .. }))
    ));

    transport.release(1);
    handle.outcome().await;

    queue.remove(id).await.unwrap();
    assert!(queue.get(id).await.is_none());
    assert!(matches!(
        queue.remove(id).await,
        Err(Error::Queue(QueueError::NotFound { .. }))
    ));

    let mut saw_removed = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, Event::Removed { id: removed } if removed == id) {
            saw_removed = true;
        }
    }
    assert!(saw_removed);
}

#[tokio::test]
async fn test_clear_never_removes_active_tasks() {
    let transport = Arc::new(MockTransport::new(|request| {
        if request.file_name.starts_with("bad") {
            Err(TransportError::Status {
                step: TransportStep::Upload,
                status: 400,
                message: "rejected".to_string(),
            })
        } else {
            Ok(json!({"count": 3}))
        }
    }));
    let (queue, _rx) = queue_with(transport, 4);

    let ok = queue.submit(pdf("ok.pdf", DocumentType::TaxForm)).await.unwrap();
    let bad = queue.submit(pdf("bad.pdf", DocumentType::TaxForm)).await.unwrap();
    ok.outcome().await;
    bad.outcome().await;

    // a task held at its permit stays pending throughout
    let gate = Arc::new(MockTransport::ok().gated());
    let (held_queue, _rx2) = queue_with(gate.clone(), 1);
    let first = held_queue.submit(pdf("x.pdf", DocumentType::TaxForm)).await.unwrap();
    let _second = held_queue.submit(pdf("y.pdf", DocumentType::TaxForm)).await.unwrap();
    assert_eq!(held_queue.clear_finished().await, 0);
    assert_eq!(held_queue.tasks().await.len(), 2);
    gate.release(1);
    first.outcome().await;
    assert_eq!(held_queue.clear_completed().await, 1);
    assert_eq!(held_queue.active().await.len(), 1);
    gate.release(1);

    assert_eq!(queue.clear_completed().await, 1);
    let remaining = queue.tasks().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, Status::Error);

    assert_eq!(queue.clear_finished().await, 1);
    assert!(queue.tasks().await.is_empty());
}

// ---------------------------------------------------------------------------
// Event streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_watch_yields_only_that_task() {
    let transport = Arc::new(MockTransport::ok().gated());
    let (queue, _rx) = queue_with(transport.clone(), 4);

    let first = queue
        .submit(pdf("a.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let second = queue
        .submit(pdf("b.pdf", DocumentType::TaxForm))
        .await
        .unwrap();
    let watched = second.id();

    let mut stream = queue.watch(watched);
    transport.release(2);
    first.outcome().await;
    second.outcome().await;

    let mut seen_completed = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), stream.next()).await
    {
        assert_eq!(event.task_id(), Some(watched));
        if matches!(event, Event::TaskCompleted { .. }) {
            seen_completed = true;
        }
    }
    assert!(seen_completed);
}
