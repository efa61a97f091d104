//! The full demo scenario: Max requests a refund for item_99, the process
//! is interrupted after refund stage 3, and a restarted process finishes
//! stages 4 and 5, applies the discount, and reports the outcome.

mod common;

use common::{demo_process, wait_for_steps, TEST_ITEM, TEST_USER};
use ostinato::agent::MessageRole;
use ostinato::refund::{opening_messages, DISCOUNT_PERCENT};
use std::time::Duration;

const STAGE_DELAY: Duration = Duration::from_millis(200);

#[tokio::test]
async fn max_refund_for_item_99_survives_interruption() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("workflows.db");
    let invocation = "refund-max-item99";

    // First process: interrupted while stage 4 is in progress.
    let process1 = demo_process(&db_path, STAGE_DELAY);
    let adapter = process1.adapter.clone();
    let task = tokio::spawn(async move {
        adapter
            .run(invocation, opening_messages(TEST_USER, TEST_ITEM))
            .await
    });
    wait_for_steps(&process1, invocation, 4).await;
    task.abort();
    let _ = task.await;

    assert!(process1.ledger.completed_refunds().is_empty());
    assert_eq!(process1.ledger.discounts_applied(), 0);

    // Restarted process: finishing the same invocation end to end.
    let process2 = demo_process(&db_path, STAGE_DELAY);
    let outcome = process2
        .adapter
        .run(invocation, opening_messages(TEST_USER, TEST_ITEM))
        .await
        .unwrap();

    // The resumed run executed exactly stages 4 and 5.
    assert_eq!(process2.ledger.stages_for(invocation), vec![4, 5]);

    // The refund completed exactly once, for the right item.
    let refunds = process2.ledger.completed_refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].item_id, TEST_ITEM);
    assert_eq!(refunds[0].invocation_id, invocation);

    // The discount step ran after the refund, exactly once.
    assert_eq!(process2.ledger.discounts_applied(), 1);

    // The final agent message reports the refund and the discount
    // percentage.
    assert!(outcome.final_content.contains(TEST_ITEM));
    assert!(outcome
        .final_content
        .contains(&format!("{}%", DISCOUNT_PERCENT)));

    // Transcript shape: opens with Max's request, closes with the agent's
    // summary.
    let first_user = outcome
        .messages
        .iter()
        .find(|m| m.role == MessageRole::User)
        .unwrap();
    assert!(first_user.content.contains(TEST_USER));
    assert!(first_user.content.contains(TEST_ITEM));
    let last = outcome.messages.last().unwrap();
    assert_eq!(last.role, MessageRole::Assistant);
    assert_eq!(last.content, outcome.final_content);
}
