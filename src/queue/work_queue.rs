// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::models::work_item::WorkItem;

#[derive(Debug)]
struct Scheduled {
    ready_at: Instant,
    seq: u64,
    item: WorkItem,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.ready_at, self.seq).cmp(&(other.ready_at, other.seq))
    }
}

/// 延迟工作队列
///
/// 按最早可调度时间出队，时间相同则按入队顺序
#[derive(Debug, Default)]
pub struct WorkQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队，`ready_at` 之前不会被取出
    pub fn push(&mut self, item: WorkItem, ready_at: Instant) {
        self.seq += 1;
        self.heap.push(Reverse(Scheduled {
            ready_at,
            seq: self.seq,
            item,
        }));
    }

    /// 立即可调度
    pub fn push_ready(&mut self, item: WorkItem) {
        self.push(item, Instant::now());
    }

    /// 取出一个在 `now` 时已就绪的工作项
    pub fn pop_ready(&mut self, now: Instant) -> Option<WorkItem> {
        match self.heap.peek() {
            Some(Reverse(head)) if head.ready_at <= now => {
                self.heap.pop().map(|Reverse(scheduled)| scheduled.item)
            }
            _ => None,
        }
    }

    /// 队首的就绪时间
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(head)| head.ready_at)
    }

    /// 移除某个作业的全部排队项
    pub fn remove_job(&mut self, job_id: Uuid) -> Vec<WorkItem> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|Reverse(scheduled)| scheduled.item.job_id == job_id);
        self.heap = kept.into();
        removed.into_iter().map(|Reverse(s)| s.item).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
