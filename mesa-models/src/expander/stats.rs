// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! The expander's observable counters and distributions.
//!
//! Names are stable for tooling compatibility.

use std::rc::Rc;

use crate::stats::{Counter, Distribution, StatsRegistry};

/// Stats for the protocol (link) path.
pub struct LinkStats {
    /// Number of times the request queue has become full.
    pub req_queue_full_events: Rc<Counter>,

    /// Number of times the response slots have become full.
    pub rsp_queue_full_events: Rc<Counter>,

    /// Number of times a stalled request was told to retry.
    pub req_retry_count: Rc<Counter>,

    /// Number of times a request send succeeded.
    pub req_send_ok: Rc<Counter>,

    /// Number of times a request send failed.
    pub req_send_failed: Rc<Counter>,

    /// Number of times a response send succeeded.
    pub rsp_send_ok: Rc<Counter>,

    /// Number of times a response send failed.
    pub rsp_send_failed: Rc<Counter>,

    /// Request queue length distribution.
    pub req_queue_len: Rc<Distribution>,

    /// Response queue length distribution.
    pub rsp_queue_len: Rc<Distribution>,

    /// Outstanding-response distribution.
    pub rsp_outstanding: Rc<Distribution>,

    /// Ticks requests spent queued before a successful send.
    pub req_queue_wait: Rc<Distribution>,

    /// Ticks responses spent queued before a successful send.
    pub rsp_queue_wait: Rc<Distribution>,

    /// Ticks between consecutive backend completions.
    pub completion_gap: Rc<Distribution>,
}

impl LinkStats {
    #[must_use]
    pub fn new(registry: &StatsRegistry) -> Self {
        Self {
            req_queue_full_events: registry.counter("req_queue_full_events"),
            rsp_queue_full_events: registry.counter("rsp_queue_full_events"),
            req_retry_count: registry.counter("req_retry_count"),
            req_send_ok: registry.counter("req_send_ok"),
            req_send_failed: registry.counter("req_send_failed"),
            rsp_send_ok: registry.counter("rsp_send_ok"),
            rsp_send_failed: registry.counter("rsp_send_failed"),
            req_queue_len: registry.distribution("req_queue_len", 0, 49, 10),
            rsp_queue_len: registry.distribution("rsp_queue_len", 0, 49, 10),
            rsp_outstanding: registry.distribution("rsp_outstanding", 0, 49, 10),
            req_queue_wait: registry.distribution("req_queue_wait_ticks", 0, 999, 50),
            rsp_queue_wait: registry.distribution("rsp_queue_wait_ticks", 0, 999, 50),
            completion_gap: registry.distribution("completion_gap_ticks", 0, 299, 10),
        }
    }
}

/// Stats for the bypass path.
pub struct BypassStats {
    /// Number of completed bypass reads.
    pub reads: Rc<Counter>,

    /// Number of completed bypass writes.
    pub writes: Rc<Counter>,

    /// Bypass access latency distribution.
    pub access_latency: Rc<Distribution>,

    /// Ticks the processing unit has been active.
    pub active_cycles: Rc<Counter>,

    /// Number of times unit execution was started.
    pub executions: Rc<Counter>,
}

impl BypassStats {
    #[must_use]
    pub fn new(registry: &StatsRegistry) -> Self {
        Self {
            reads: registry.counter("bypass_reads"),
            writes: registry.counter("bypass_writes"),
            access_latency: registry.distribution("bypass_access_latency_ticks", 0, 499, 10),
            active_cycles: registry.counter("bypass_active_cycles"),
            executions: registry.counter("bypass_executions"),
        }
    }
}
