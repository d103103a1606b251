//! Upload task driver: the lifecycle of a single task.

use crate::error::{TransportError, TransportStep};
use crate::registry::{Protocol, ResolvedEndpoint};
use crate::transport::{UploadRequest, summarize};
use crate::types::{
    Event, FailureKind, NotificationKind, Status, TaskId, TaskOutcome, UploadResult,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{SubmitRequest, UploadQueue};

/// Message stored on tasks that ended as duplicates
pub(crate) const DUPLICATE_MESSAGE: &str = "Duplicato (ignorato)";

/// Message stored on cancelled tasks
pub(crate) const CANCELLED_MESSAGE: &str = "Caricamento annullato";

/// Progress a task reports as soon as it is dispatched
pub(crate) const DISPATCH_PERCENT: u8 = 10;

/// Progress ceiling until the server has answered
const UPLOAD_CEILING_PERCENT: u8 = 90;

/// Everything a driver needs, moved into its spawned task
pub(crate) struct UploadTaskContext {
    pub(crate) id: TaskId,
    pub(crate) request: SubmitRequest,
    pub(crate) endpoint: ResolvedEndpoint,
    pub(crate) queue: UploadQueue,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) outcome_tx: oneshot::Sender<TaskOutcome>,
}

/// Map transferred bytes into the 10–90 % band
///
/// A task at 100 % has been acknowledged by the server; the transfer itself
/// never reports more than 90 %.
///
/// # Example
/// ```
/// use docingest::queue::upload_percent;
///
/// assert_eq!(upload_percent(0, 1000), 10);
/// assert_eq!(upload_percent(500, 1000), 50);
/// assert_eq!(upload_percent(1000, 1000), 90);
/// ```
pub fn upload_percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return UPLOAD_CEILING_PERCENT;
    }
    let scaled = u128::from(loaded.min(total)) * 80 / u128::from(total);
    // scaled <= 80, so the sum fits
    (u128::from(DISPATCH_PERCENT) + scaled).min(u128::from(UPLOAD_CEILING_PERCENT)) as u8
}

/// How a transport failure is reported on the task
pub(crate) fn failure_kind(err: &TransportError) -> FailureKind {
    if err.is_duplicate() {
        return FailureKind::Duplicate;
    }
    match (err, err.step()) {
        (TransportError::Network { .. }, _) => FailureKind::Transport,
        (_, TransportStep::CreateJob) => FailureKind::JobCreation,
        (_, TransportStep::Upload) => FailureKind::Upload,
    }
}

/// What ended the transfer
enum Finish {
    Success(serde_json::Value),
    Failure(TransportError),
    Cancelled,
}

/// Drive one task from Pending to a terminal status
///
/// Phases:
/// 1. Wait for a concurrency permit (the task stays Pending meanwhile)
/// 2. Transition to Uploading, even when cancelled while waiting
/// 3. Create the remote job when the endpoint is job-based
/// 4. Upload the file, forwarding byte progress
/// 5. Record the outcome, notify, resolve the handle
pub(crate) async fn run_upload_task(mut ctx: UploadTaskContext) {
    let id = ctx.id;
    let queue = ctx.queue.clone();
    let cancel = ctx.cancel_token.clone();

    // Phase 1: concurrency permit
    let permit = tokio::select! {
        _ = cancel.cancelled() => None,
        permit = queue.state.concurrent_limit.clone().acquire_owned() => permit.ok(),
    };

    // Phase 2: dispatch
    if !dispatch(&ctx).await {
        return;
    }
    let Some(_permit) = permit else {
        // a task never leaves Pending straight for Error
        tracing::info!(task_id = id.0, "upload cancelled before dispatch");
        finalize(ctx, Finish::Cancelled).await;
        return;
    };

    // Phase 3: job creation
    let upload_path = match ctx.endpoint.protocol {
        Protocol::Direct => ctx.endpoint.upload_path.to_string(),
        Protocol::Job { create_path } => {
            let created = tokio::select! {
                _ = cancel.cancelled() => None,
                result = queue.transport.create_job(
                    create_path,
                    ctx.request.document_type,
                    &ctx.request.name,
                ) => Some(result),
            };
            match created {
                None => {
                    finalize(ctx, Finish::Cancelled).await;
                    return;
                }
                Some(Err(e)) => {
                    finalize(ctx, Finish::Failure(e)).await;
                    return;
                }
                Some(Ok(job_id)) => {
                    tracing::debug!(task_id = id.0, job_id = %job_id, "remote job created");
                    queue
                        .event_tx
                        .send(Event::JobCreated {
                            id,
                            job_id: job_id.clone(),
                        })
                        .ok();
                    match ctx.endpoint.upload_path_for_job(&job_id) {
                        Some(path) => path,
                        None => {
                            let e = TransportError::InvalidResponse {
                                step: TransportStep::CreateJob,
                                message: format!("unusable job identifier {job_id:?}"),
                            };
                            finalize(ctx, Finish::Failure(e)).await;
                            return;
                        }
                    }
                }
            }
        }
    };

    // Phase 4: upload
    let finish = upload(&mut ctx, upload_path).await;

    // Phase 5: outcome
    finalize(ctx, finish).await;
}

/// Move the task to Uploading and announce it
///
/// Returns `false` when the task was removed or finished by someone else.
async fn dispatch(ctx: &UploadTaskContext) -> bool {
    let (id, queue) = (ctx.id, &ctx.queue);
    let started = queue
        .store
        .transition(id, Status::Uploading, "start", |task| {
            task.progress = DISPATCH_PERCENT;
            task.started_at = Some(chrono::Utc::now());
        })
        .await;
    if let Err(e) = started {
        tracing::warn!(task_id = id.0, error = %e, "task could not be dispatched");
        queue.state.active_tasks.lock().await.remove(&id);
        return false;
    }
    queue
        .event_tx
        .send(Event::UploadStarted {
            id,
            endpoint: ctx.endpoint.upload_path.to_string(),
        })
        .ok();
    queue
        .event_tx
        .send(Event::Progress {
            id,
            percent: DISPATCH_PERCENT,
        })
        .ok();
    true
}

async fn upload(ctx: &mut UploadTaskContext, path: String) -> Finish {
    let queue = &ctx.queue;
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let request = UploadRequest {
        path,
        file_name: ctx.request.name.clone(),
        document_type: ctx.request.document_type,
        content: std::mem::take(&mut ctx.request.content),
    };

    let transfer = queue.transport.upload(request, progress_tx);
    tokio::pin!(transfer);

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => return Finish::Cancelled,
            result = &mut transfer => {
                return match result {
                    Ok(body) => Finish::Success(body),
                    Err(e) => Finish::Failure(e),
                };
            }
            Some(progress) = progress_rx.recv() => {
                report_progress(queue, ctx.id, upload_percent(progress.loaded, progress.total)).await;
            }
        }
    }
}

/// Raise a task's progress; lower or equal values are ignored
async fn report_progress(queue: &UploadQueue, id: TaskId, percent: u8) {
    let raised = queue
        .store
        .update(id, |task| {
            if task.status == Status::Uploading && percent > task.progress {
                task.progress = percent;
                true
            } else {
                false
            }
        })
        .await
        .unwrap_or(false);

    if raised {
        queue.event_tx.send(Event::Progress { id, percent }).ok();
    }
}

/// Record the terminal status, notify and resolve the handle
async fn finalize(ctx: UploadTaskContext, finish: Finish) {
    let UploadTaskContext {
        id,
        request,
        queue,
        outcome_tx,
        ..
    } = ctx;

    let outcome = match finish {
        Finish::Success(body) => TaskOutcome::Completed(UploadResult {
            summary: summarize(&body),
            body,
        }),
        Finish::Cancelled => TaskOutcome::Failed {
            kind: FailureKind::Cancelled,
            message: CANCELLED_MESSAGE.to_string(),
        },
        Finish::Failure(e) => match failure_kind(&e) {
            FailureKind::Duplicate => TaskOutcome::Duplicate {
                message: DUPLICATE_MESSAGE.to_string(),
            },
            kind => TaskOutcome::Failed {
                kind,
                message: e.message().to_string(),
            },
        },
    };

    let recorded = match &outcome {
        TaskOutcome::Completed(result) => {
            let result = result.clone();
            queue
                .store
                .transition(id, Status::Completed, "complete", move |task| {
                    task.progress = 100;
                    task.finished_at = Some(chrono::Utc::now());
                    task.result = Some(result);
                })
                .await
        }
        TaskOutcome::Duplicate { message } => {
            let message = message.clone();
            queue
                .store
                .transition(id, Status::Error, "fail", move |task| {
                    task.finished_at = Some(chrono::Utc::now());
                    task.error = Some(message);
                    task.failure = Some(FailureKind::Duplicate);
                })
                .await
        }
        TaskOutcome::Failed { kind, message } => {
            let (kind, message) = (*kind, message.clone());
            queue
                .store
                .transition(id, Status::Error, "fail", move |task| {
                    task.finished_at = Some(chrono::Utc::now());
                    task.error = Some(message);
                    task.failure = Some(kind);
                })
                .await
        }
    };

    queue.state.active_tasks.lock().await.remove(&id);

    if let Err(e) = recorded {
        tracing::warn!(task_id = id.0, error = %e, "could not record task outcome");
        outcome_tx.send(outcome).ok();
        return;
    }

    match &outcome {
        TaskOutcome::Completed(result) => {
            tracing::info!(task_id = id.0, name = %request.name, summary = %result.summary, "upload completed");
            queue
                .event_tx
                .send(Event::TaskCompleted {
                    id,
                    summary: result.summary.clone(),
                })
                .ok();
            queue
                .notifications
                .push(
                    NotificationKind::Success,
                    request.name.as_str(),
                    result.summary.as_str(),
                    Some(id),
                )
                .await;
        }
        TaskOutcome::Duplicate { message } => {
            tracing::info!(task_id = id.0, name = %request.name, "document already ingested, ignored");
            emit_failure(&queue, id, FailureKind::Duplicate, message, &request.name).await;
        }
        TaskOutcome::Failed { kind, message } => {
            tracing::warn!(task_id = id.0, name = %request.name, ?kind, error = %message, "upload failed");
            emit_failure(&queue, id, *kind, message, &request.name).await;
        }
    }

    // the caller may have dropped the handle
    outcome_tx.send(outcome).ok();
}

async fn emit_failure(queue: &UploadQueue, id: TaskId, kind: FailureKind, message: &str, name: &str) {
    queue
        .event_tx
        .send(Event::TaskFailed {
            id,
            kind,
            error: message.to_string(),
        })
        .ok();
    queue
        .notifications
        .push(NotificationKind::Error, name, message, Some(id))
        .await;
}
