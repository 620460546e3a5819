use crate::context::Context;
use crate::output;
use forge_core::error::{ForgeError, Result};
use forge_core::model::{QueueItemPayload, QueueItemType};

pub async fn run(ctx: &Context, loop_ref: String, text: String, now: bool, next_prompt: bool) -> Result<()> {
    if now && next_prompt {
        return Err(ForgeError::InvalidArgument("--now and --next-prompt are mutually exclusive".into()));
    }
    let lp = ctx.store.get_loop(&loop_ref).await?;

    let item = if next_prompt {
        ctx.store
            .enqueue(&lp.id, QueueItemType::NextPromptOverride, QueueItemPayload::NextPromptOverride { prompt: text, is_path: false }, true)
            .await?
    } else {
        ctx.store.enqueue(&lp.id, QueueItemType::Message, QueueItemPayload::Message { text }, now).await?
    };

    output::print_one(ctx.mode, &item, |item| format!("enqueued {} ({}) for {}", item.item_type, item.id, lp.name));
    Ok(())
}
