use crate::cli::QueueCommand;
use crate::context::Context;
use crate::output;
use forge_core::error::{ForgeError, Result};
use forge_core::store::MoveToWire;

pub async fn run(ctx: &Context, command: QueueCommand) -> Result<()> {
    match command {
        QueueCommand::Ls { loop_ref, all } => {
            let lp = ctx.store.get_loop(&loop_ref).await?;
            let items = ctx.store.list_queue(&lp.id, all).await?;
            output::print_list(ctx.mode, &items, |item| {
                format!("{:<8} {:<10} {:<24} pos={}", &item.id[..8.min(item.id.len())], item.status, item.item_type, item.position)
            });
        }
        QueueCommand::Move { loop_ref, item_id, to } => {
            let lp = ctx.store.get_loop(&loop_ref).await?;
            let to = parse_move_to(&to)?;
            ctx.store.move_queue_item(&lp.id, &item_id, to).await?;
            if ctx.mode == crate::output::OutputMode::Text {
                println!("moved {item_id} to {}", if matches!(to, MoveToWire::Front) { "front" } else { "back" });
            }
        }
        QueueCommand::Rm { loop_ref, item_id } => {
            let lp = ctx.store.get_loop(&loop_ref).await?;
            ctx.store.remove_queue_item(&lp.id, &item_id).await?;
            if ctx.mode == crate::output::OutputMode::Text {
                println!("removed {item_id}");
            }
        }
        QueueCommand::Clear { loop_ref } => {
            let lp = ctx.store.get_loop(&loop_ref).await?;
            let removed = ctx.store.clear_queue(&lp.id).await?;
            if ctx.mode == crate::output::OutputMode::Text {
                println!("cleared {removed} pending item(s) from {}", lp.name);
            }
        }
    }
    Ok(())
}

fn parse_move_to(raw: &str) -> Result<MoveToWire> {
    match raw {
        "front" => Ok(MoveToWire::Front),
        "back" => Ok(MoveToWire::Back),
        other => Err(ForgeError::InvalidArgument(format!("--to must be front|back, got '{other}'"))),
    }
}
