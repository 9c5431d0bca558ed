//! Orchestration engine.
//!
//! Runs the four extraction nodes for a job according to its strategy,
//! fans tenancy extraction out per room configuration, and merges the
//! results. Node tasks run on the tokio runtime bounded by semaphores; all
//! store writes happen on the coordinator task, which consumes a signal
//! channel from the node tasks. A node task that observes the job's
//! cancellation token exits without sending, so late results are discarded.

mod fanout;

pub use fanout::{collect_configurations, FanoutTarget};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use extraction::{
    merge_nodes, validate_node, ErrorCategory, ExtractionContext, Extractor, NodeType,
};

use crate::config::OrchestratorConfig;
use crate::jobs::events::{ProgressEvent, ProgressEventType};
use crate::jobs::job::{phases, ExecutionStrategy, Job};
use crate::jobs::node::{NodeExecution, NodeStatus};
use crate::jobs::store::MemoryStore;

/// Final result of orchestrating one job.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub success: bool,
    pub merged: Option<Value>,
    pub quality_score: f64,
    pub nodes_completed: usize,
    pub nodes_failed: usize,
    pub error: Option<String>,
}

#[derive(Debug)]
struct NodeSuccess {
    data: Value,
    confidence: f64,
    validation_errors: u32,
    validation_warnings: u32,
}

#[derive(Debug)]
struct NodeFailure {
    error: String,
    category: ErrorCategory,
}

/// Messages node tasks send to the coordinator.
#[derive(Debug)]
enum NodeSignal {
    Started {
        exec_id: Uuid,
        node: NodeType,
        config_key: Option<String>,
    },
    Retrying {
        exec_id: Uuid,
        node: NodeType,
        attempt: u32,
        category: ErrorCategory,
        error: String,
    },
    Finished {
        exec_id: Uuid,
        node: NodeType,
        config_key: Option<String>,
        elapsed: f64,
        retries: u32,
        result: Result<NodeSuccess, NodeFailure>,
    },
}

pub struct Engine<E: Extractor> {
    extractor: Arc<E>,
    store: Arc<MemoryStore>,
    config: OrchestratorConfig,
}

impl<E: Extractor + 'static> Engine<E> {
    pub fn new(extractor: Arc<E>, store: Arc<MemoryStore>, config: OrchestratorConfig) -> Self {
        Self {
            extractor,
            store,
            config,
        }
    }

    /// Run one job to completion (or cancellation) and return the outcome.
    ///
    /// The job record must already exist in the store. This method is the
    /// single writer for the job's node records and progress while it runs.
    pub async fn orchestrate(&self, job: &Job, cancel: CancellationToken) -> EngineOutcome {
        let job_id = job.id;
        info!(job_id = %job_id, strategy = %job.strategy, url = %job.url, "orchestration started");

        let applied = self
            .store
            .update_progress(job_id, 10.0, Some(phases::EXTRACTING_DATA));
        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::JobStarted,
            "Extraction started",
            applied,
        ));

        let mut exec_ids: BTreeMap<NodeType, Uuid> = BTreeMap::new();
        for node in NodeType::ALL {
            let exec = NodeExecution::new(job_id, node);
            exec_ids.insert(node, exec.id);
            self.store.insert_node(exec);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let node_semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_nodes));
        let fanout_semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fanout));

        let total = NodeType::ALL.len();
        let mut outstanding = 0usize;
        let mut launched: BTreeSet<NodeType> = BTreeSet::new();
        let mut sequence: VecDeque<NodeType> = VecDeque::new();
        let independents: Vec<NodeType> = NodeType::ALL
            .into_iter()
            .filter(|n| n.dependencies().is_empty())
            .collect();

        match job.strategy {
            ExecutionStrategy::Parallel => {
                for node in NodeType::ALL {
                    self.spawn_node(
                        job,
                        node,
                        exec_ids[&node],
                        BTreeMap::new(),
                        None,
                        node_semaphore.clone(),
                        tx.clone(),
                        cancel.clone(),
                    );
                    launched.insert(node);
                    outstanding += 1;
                }
            }
            ExecutionStrategy::Sequential => {
                sequence = NodeType::ALL.into_iter().collect();
                let first = sequence.pop_front().unwrap_or(NodeType::BasicInfo);
                self.spawn_node(
                    job,
                    first,
                    exec_ids[&first],
                    BTreeMap::new(),
                    None,
                    node_semaphore.clone(),
                    tx.clone(),
                    cancel.clone(),
                );
                launched.insert(first);
                outstanding += 1;
            }
            ExecutionStrategy::Hybrid => {
                for node in &independents {
                    self.spawn_node(
                        job,
                        *node,
                        exec_ids[node],
                        BTreeMap::new(),
                        None,
                        node_semaphore.clone(),
                        tx.clone(),
                        cancel.clone(),
                    );
                    launched.insert(*node);
                    outstanding += 1;
                }
            }
        }

        let mut outputs: BTreeMap<NodeType, Value> = BTreeMap::new();
        let mut fanout_results: BTreeMap<String, Value> = BTreeMap::new();
        let mut main_terminal = 0usize;
        let mut main_running = 0usize;
        let mut nodes_failed = 0usize;
        let mut fanout_spawned = false;
        let mut cancelled = false;

        while outstanding > 0 {
            let signal = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                signal = rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            match signal {
                NodeSignal::Started {
                    exec_id,
                    node,
                    config_key,
                } => {
                    if config_key.is_none() {
                        main_running += 1;
                    }
                    let now = Utc::now();
                    self.store.update_node(exec_id, |n| {
                        n.status = NodeStatus::Running;
                        n.started_at = Some(now);
                    });

                    let pct = node_progress(main_terminal, main_running, total);
                    let applied = self.store.update_progress(job_id, pct, None);
                    let (event_type, message) = match &config_key {
                        Some(key) => (
                            ProgressEventType::FanoutStarted,
                            format!("Tenancy extraction started for {key}"),
                        ),
                        None => (
                            ProgressEventType::NodeStarted,
                            format!("{} started", node.label()),
                        ),
                    };
                    self.store.append_event(
                        ProgressEvent::new(job_id, event_type, message, applied).with_metadata(
                            json!({"node": node.as_str(), "config_key": config_key}),
                        ),
                    );
                }

                NodeSignal::Retrying {
                    exec_id,
                    node,
                    attempt,
                    category,
                    error,
                } => {
                    debug!(job_id = %job_id, node = %node, attempt, category = %category, "node retrying");
                    self.store.update_node(exec_id, |n| {
                        n.retry_count = attempt;
                        n.error_message = Some(error.clone());
                        n.error_category = Some(category);
                    });
                    let current = self
                        .store
                        .job(job_id)
                        .map(|j| j.progress_percentage)
                        .unwrap_or(0.0);
                    self.store.append_event(
                        ProgressEvent::new(
                            job_id,
                            ProgressEventType::NodeRetrying,
                            format!("{} retrying after {} error", node.label(), category),
                            current,
                        )
                        .with_metadata(json!({
                            "node": node.as_str(),
                            "attempt": attempt,
                            "category": category.as_str(),
                        })),
                    );
                }

                NodeSignal::Finished {
                    exec_id,
                    node,
                    config_key,
                    elapsed,
                    retries,
                    result,
                } => {
                    outstanding -= 1;
                    let is_fanout = config_key.is_some();
                    if !is_fanout {
                        main_terminal += 1;
                        main_running = main_running.saturating_sub(1);
                    }
                    let now = Utc::now();

                    match result {
                        Ok(success) => {
                            let data = success.data.clone();
                            self.store.update_node(exec_id, |n| {
                                n.status = NodeStatus::Completed;
                                n.completed_at = Some(now);
                                n.execution_time = Some(elapsed);
                                n.extracted_data = Some(success.data);
                                n.confidence_score = Some(success.confidence);
                                n.validation_errors = success.validation_errors;
                                n.validation_warnings = success.validation_warnings;
                                n.retry_count = retries;
                            });

                            if let Some(key) = &config_key {
                                fanout_results.insert(key.clone(), data);
                                let applied = self.store.update_progress(job_id, 70.0, None);
                                self.store.append_event(
                                    ProgressEvent::new(
                                        job_id,
                                        ProgressEventType::FanoutCompleted,
                                        format!("Tenancy extraction completed for {key}"),
                                        applied,
                                    )
                                    .with_metadata(json!({"config_key": key})),
                                );
                            } else {
                                outputs.insert(node, data.clone());
                                self.store.update_job(job_id, |j| {
                                    j.extracted_data.insert(node, data);
                                });
                                let pct = node_progress(main_terminal, main_running, total);
                                let applied = self.store.update_progress(job_id, pct, None);
                                self.store.append_event(
                                    ProgressEvent::new(
                                        job_id,
                                        ProgressEventType::NodeCompleted,
                                        format!("{} completed", node.label()),
                                        applied,
                                    )
                                    .with_metadata(json!({"node": node.as_str()})),
                                );
                            }
                        }
                        Err(failure) => {
                            if !is_fanout {
                                nodes_failed += 1;
                            }
                            warn!(
                                job_id = %job_id,
                                node = %node,
                                category = %failure.category,
                                error = %failure.error,
                                "node failed"
                            );
                            self.store.update_node(exec_id, |n| {
                                n.status = NodeStatus::Failed;
                                n.completed_at = Some(now);
                                n.execution_time = Some(elapsed);
                                n.error_message = Some(failure.error.clone());
                                n.error_category = Some(failure.category);
                                n.retry_count = retries;
                            });
                            let pct = node_progress(main_terminal, main_running, total);
                            let applied = self.store.update_progress(job_id, pct, None);
                            self.store.append_event(
                                ProgressEvent::new(
                                    job_id,
                                    ProgressEventType::NodeFailed,
                                    format!("{} failed: {}", node.label(), failure.error),
                                    applied,
                                )
                                .with_metadata(json!({
                                    "node": node.as_str(),
                                    "config_key": config_key,
                                    "category": failure.category.as_str(),
                                })),
                            );
                        }
                    }

                    // fan tenancy extraction out once room configs land
                    if !is_fanout && node == NodeType::RoomConfigs && !fanout_spawned {
                        if let Some(room_output) = outputs.get(&NodeType::RoomConfigs).cloned() {
                            fanout_spawned = true;
                            let targets = collect_configurations(&room_output);
                            if !targets.is_empty() {
                                let applied = self.store.update_progress(
                                    job_id,
                                    70.0,
                                    Some(phases::TENANCY_EXTRACTION),
                                );
                                self.store.append_event(
                                    ProgressEvent::new(
                                        job_id,
                                        ProgressEventType::FanoutStarted,
                                        format!(
                                            "Fanning out tenancy extraction across {} configurations",
                                            targets.len()
                                        ),
                                        applied,
                                    )
                                    .with_metadata(json!({"configurations": targets.len()})),
                                );

                                let mut deps = BTreeMap::new();
                                if let Some(basic) = outputs.get(&NodeType::BasicInfo) {
                                    deps.insert(NodeType::BasicInfo, basic.clone());
                                }
                                deps.insert(NodeType::RoomConfigs, room_output);

                                for (index, target) in targets.into_iter().enumerate() {
                                    let exec = NodeExecution::fanout(job_id, target.key.clone());
                                    let exec_id = exec.id;
                                    self.store.insert_node(exec);
                                    self.spawn_node(
                                        job,
                                        NodeType::TenancyInfo,
                                        exec_id,
                                        deps.clone(),
                                        Some((target, index)),
                                        fanout_semaphore.clone(),
                                        tx.clone(),
                                        cancel.clone(),
                                    );
                                    outstanding += 1;
                                }
                            }
                        }
                    }

                    // launch successors per strategy
                    if !is_fanout {
                        match job.strategy {
                            ExecutionStrategy::Sequential => {
                                if let Some(next) = sequence.pop_front() {
                                    self.spawn_node(
                                        job,
                                        next,
                                        exec_ids[&next],
                                        dependency_outputs(next, &outputs),
                                        None,
                                        node_semaphore.clone(),
                                        tx.clone(),
                                        cancel.clone(),
                                    );
                                    launched.insert(next);
                                    outstanding += 1;
                                }
                            }
                            ExecutionStrategy::Hybrid => {
                                if main_terminal == independents.len()
                                    && !launched.contains(&NodeType::TenancyInfo)
                                {
                                    self.spawn_node(
                                        job,
                                        NodeType::TenancyInfo,
                                        exec_ids[&NodeType::TenancyInfo],
                                        dependency_outputs(NodeType::TenancyInfo, &outputs),
                                        None,
                                        node_semaphore.clone(),
                                        tx.clone(),
                                        cancel.clone(),
                                    );
                                    launched.insert(NodeType::TenancyInfo);
                                    outstanding += 1;
                                }
                            }
                            ExecutionStrategy::Parallel => {}
                        }
                    }
                }
            }
        }

        drop(tx);

        if cancelled {
            info!(job_id = %job_id, "orchestration cancelled");
            return EngineOutcome {
                success: false,
                merged: None,
                quality_score: 0.0,
                nodes_completed: outputs.len(),
                nodes_failed,
                error: Some("job cancelled".to_string()),
            };
        }

        let nodes_completed = outputs.len();
        if outputs.is_empty() {
            warn!(job_id = %job_id, "all extraction nodes failed");
            return EngineOutcome {
                success: false,
                merged: None,
                quality_score: 0.0,
                nodes_completed,
                nodes_failed,
                error: Some("all extraction nodes failed".to_string()),
            };
        }

        let applied = self
            .store
            .update_progress(job_id, 80.0, Some(phases::MERGING_DATA));
        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::MergeStarted,
            "Merging extracted data",
            applied,
        ));

        let merge = merge_nodes(&outputs, &fanout_results);
        let applied = self.store.update_progress(job_id, 85.0, None);
        self.store.append_event(
            ProgressEvent::new(
                job_id,
                ProgressEventType::MergeCompleted,
                format!(
                    "Merge completed, {} of {} conflicts resolved",
                    merge.conflicts_resolved, merge.conflicts_found
                ),
                applied,
            )
            .with_metadata(json!({
                "quality_score": merge.quality_score,
                "completeness": merge.completeness,
                "coverage": merge.coverage,
                "consistency": merge.consistency,
            })),
        );

        let applied = self
            .store
            .update_progress(job_id, 90.0, Some(phases::COMPETITOR_ANALYSIS));
        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::PhaseChanged,
            "Analyzing market position",
            applied,
        ));

        let applied = self
            .store
            .update_progress(job_id, 95.0, Some(phases::FINALIZING));
        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::PhaseChanged,
            "Finalizing listing record",
            applied,
        ));

        info!(
            job_id = %job_id,
            nodes_completed,
            nodes_failed,
            quality = merge.quality_score,
            "orchestration finished"
        );

        EngineOutcome {
            success: true,
            merged: merge.merged,
            quality_score: merge.quality_score,
            nodes_completed,
            nodes_failed,
            error: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_node(
        &self,
        job: &Job,
        node: NodeType,
        exec_id: Uuid,
        dependencies: BTreeMap<NodeType, Value>,
        fanout: Option<(FanoutTarget, usize)>,
        semaphore: Arc<Semaphore>,
        tx: mpsc::UnboundedSender<NodeSignal>,
        cancel: CancellationToken,
    ) {
        let extractor = self.extractor.clone();
        let url = job.url.clone();
        let job_id = job.id;
        let timeout = self.config.node_timeout;
        let max_retries = self.config.node_max_retries;
        let retry_delay = self.config.node_retry_delay;

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }

            let (config_key, ctx) = match fanout {
                Some((target, index)) => {
                    let key = target.key.clone();
                    let ctx = ExtractionContext {
                        job_id: Some(job_id),
                        dependencies,
                        target_configuration: Some(target.configuration),
                        configuration_name: Some(target.name),
                        configuration_index: Some(index),
                    };
                    (Some(key), ctx)
                }
                None => {
                    let ctx = ExtractionContext {
                        dependencies,
                        ..ExtractionContext::for_job(job_id)
                    };
                    (None, ctx)
                }
            };

            let _ = tx.send(NodeSignal::Started {
                exec_id,
                node,
                config_key: config_key.clone(),
            });

            let started = Instant::now();
            let mut attempt = 1u32;
            loop {
                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = tokio::time::timeout(timeout, extractor.extract(&url, node, &ctx)) => result,
                };

                let (error, category) = match result {
                    Ok(Ok(data)) => {
                        let report = validate_node(node, &data);
                        let _ = tx.send(NodeSignal::Finished {
                            exec_id,
                            node,
                            config_key,
                            elapsed: started.elapsed().as_secs_f64(),
                            retries: attempt - 1,
                            result: Ok(NodeSuccess {
                                data,
                                confidence: report.completeness_score,
                                validation_errors: report.errors.len() as u32,
                                validation_warnings: report.warnings.len() as u32,
                            }),
                        });
                        return;
                    }
                    Ok(Err(error)) => {
                        let category = error.category();
                        (error.to_string(), category)
                    }
                    Err(_) => (
                        format!("extraction timed out after {}s", timeout.as_secs()),
                        ErrorCategory::Timeout,
                    ),
                };

                if category.is_retryable() && attempt <= max_retries {
                    let _ = tx.send(NodeSignal::Retrying {
                        exec_id,
                        node,
                        attempt,
                        category,
                        error,
                    });
                    // linear backoff: delay * attempt number
                    let backoff = retry_delay * attempt;
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                    continue;
                }

                let _ = tx.send(NodeSignal::Finished {
                    exec_id,
                    node,
                    config_key,
                    elapsed: started.elapsed().as_secs_f64(),
                    retries: attempt - 1,
                    result: Err(NodeFailure { error, category }),
                });
                return;
            }
        });
    }
}

/// Weighted progress over the four main nodes: a 10% base for setup, 80%
/// split across terminal nodes, 20% partial credit for running ones.
fn node_progress(terminal: usize, running: usize, total: usize) -> f64 {
    let total = total as f64;
    10.0 + (terminal as f64 / total) * 80.0 + (running as f64 / total) * 20.0
}

fn dependency_outputs(
    node: NodeType,
    outputs: &BTreeMap<NodeType, Value>,
) -> BTreeMap<NodeType, Value> {
    node.dependencies()
        .iter()
        .filter_map(|dep| outputs.get(dep).map(|value| (*dep, value.clone())))
        .collect()
}
