//! Queue dispatch semantics: `peek_next`'s pure decision logic over a list
//! of pending candidates already ordered by position.
//! Persistence (position assignment, status transitions) lives in
//! `store::repo`; this module is the gating/ordering policy only, kept
//! separate so it can be property-tested without a database.

use crate::model::{ConditionType, LoopQueueItem, LoopState, QueueItemPayload, QueueItemType};

/// Picks the next dispatchable item, or `None` if the head of the queue is
/// gated and nothing may jump ahead of it: strict FIFO, no reordering.
///
/// `candidates` must already be pending items in position order.
/// `previous_ok` is `Some(true)` if the last iteration ended
/// `iteration_end_clean`, `Some(false)` otherwise, `None` if no iteration
/// has run yet (treated as not-ok for `when_previous_ok` gating).
pub fn peek_next(
    candidates: &[LoopQueueItem],
    state: LoopState,
    previous_ok: Option<bool>,
) -> Option<LoopQueueItem> {
    let dispatchable: Vec<&LoopQueueItem> = candidates
        .iter()
        .filter(|i| i.item_type != QueueItemType::NextPromptOverride)
        .collect();

    if let Some(kill) = dispatchable
        .iter()
        .find(|i| i.item_type == QueueItemType::ControlKillNow)
    {
        return Some((*kill).clone());
    }

    let head = dispatchable.first()?;
    if gate_satisfied(head, state, previous_ok) {
        Some((*head).clone())
    } else {
        None
    }
}

fn gate_satisfied(item: &LoopQueueItem, state: LoopState, previous_ok: Option<bool>) -> bool {
    match &item.payload {
        QueueItemPayload::Conditional { condition_type, .. } => match condition_type {
            ConditionType::WhenIdle => state == LoopState::Idle,
            ConditionType::WhenCooldownOver => state != LoopState::Cooldown,
            ConditionType::WhenPreviousOk => previous_ok.unwrap_or(false),
        },
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueueItemStatus;

    fn item(item_type: QueueItemType, payload: QueueItemPayload, position: i64) -> LoopQueueItem {
        LoopQueueItem {
            id: format!("item-{position}"),
            loop_id: "loop-1".into(),
            item_type,
            status: QueueItemStatus::Pending,
            position,
            payload,
            created_at: "2026-01-01T00:00:00Z".into(),
            dispatched_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn kill_now_preempts_all_other_pending_items() {
        let msg = item(
            QueueItemType::Message,
            QueueItemPayload::Message { text: "hi".into() },
            0,
        );
        let kill = item(QueueItemType::ControlKillNow, QueueItemPayload::Control, 1);
        let candidates = vec![msg, kill.clone()];
        let next = peek_next(&candidates, LoopState::Running, None).unwrap();
        assert_eq!(next.id, kill.id);
    }

    #[test]
    fn next_prompt_override_is_never_returned() {
        let ov = item(
            QueueItemType::NextPromptOverride,
            QueueItemPayload::NextPromptOverride {
                prompt: "p".into(),
                is_path: false,
            },
            0,
        );
        assert!(peek_next(&[ov], LoopState::Running, None).is_none());
    }

    #[test]
    fn unsatisfied_conditional_blocks_the_head_strictly() {
        let cond = item(
            QueueItemType::Conditional,
            QueueItemPayload::Conditional {
                message: "m".into(),
                condition_type: ConditionType::WhenIdle,
                condition_params: serde_json::Value::Null,
            },
            0,
        );
        let msg = item(
            QueueItemType::Message,
            QueueItemPayload::Message { text: "later".into() },
            1,
        );
        let candidates = vec![cond, msg];
        assert!(peek_next(&candidates, LoopState::Running, None).is_none());
    }

    #[test]
    fn satisfied_conditional_is_dispatched() {
        let cond = item(
            QueueItemType::Conditional,
            QueueItemPayload::Conditional {
                message: "m".into(),
                condition_type: ConditionType::WhenIdle,
                condition_params: serde_json::Value::Null,
            },
            0,
        );
        let id = cond.id.clone();
        let next = peek_next(&[cond], LoopState::Idle, None).unwrap();
        assert_eq!(next.id, id);
    }

    #[test]
    fn when_previous_ok_requires_clean_prior_iteration() {
        let cond = item(
            QueueItemType::Conditional,
            QueueItemPayload::Conditional {
                message: "m".into(),
                condition_type: ConditionType::WhenPreviousOk,
                condition_params: serde_json::Value::Null,
            },
            0,
        );
        assert!(peek_next(&[cond.clone()], LoopState::Running, None).is_none());
        assert!(peek_next(&[cond.clone()], LoopState::Running, Some(false)).is_none());
        assert!(peek_next(&[cond], LoopState::Running, Some(true)).is_some());
    }

    #[test]
    fn empty_queue_returns_none() {
        assert!(peek_next(&[], LoopState::Idle, None).is_none());
    }
}
