//! Headless snip: capture the primary monitor, replay a drag, send the crop.

use clap::Parser;
use snip_chat_lib::overlay::OverlayOutcome;
use snip_chat_lib::RunOptions;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "snip-chat")]
#[command(about = "Snip a screen region and send it to a chat conversation")]
struct Cli {
    /// Drag from x0,y0 to x1,y1 in view coordinates (default: middle half of the view)
    #[arg(long, value_parser = parse_selection)]
    select: Option<(f64, f64, f64, f64)>,

    /// Size of the overlay surface the capture is fitted into
    #[arg(long, value_parser = parse_view, default_value = "1280x800")]
    view: (u32, u32),

    /// Send to this conversation instead of the last one used
    #[arg(long)]
    conversation: Option<Uuid>,

    /// Config file (defaults to <config_dir>/snip-chat/config.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_selection(raw: &str) -> Result<(f64, f64, f64, f64), String> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        [x0, y0, x1, y1] => Ok((*x0, *y0, *x1, *y1)),
        _ => Err(format!("expected x0,y0,x1,y1, got {} value(s)", values.len())),
    }
}

fn parse_view(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {raw:?}"))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("width: {e}"))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("view must be non-empty".into());
    }
    Ok((w, h))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let report = snip_chat_lib::run(RunOptions {
        select: cli.select,
        view: cli.view,
        conversation: cli.conversation,
        config: cli.config,
    })
    .await?;

    for signal in &report.signals {
        println!("{}", signal);
    }
    match report.outcome {
        Some(OverlayOutcome::Sent(receipt)) => {
            println!(
                "{} -> conversation {}",
                receipt.attachment.path.display(),
                receipt.conversation_id
            );
            Ok(())
        }
        Some(OverlayOutcome::Failed(e)) => Err(e.into()),
        Some(OverlayOutcome::Cancelled) => Err("snip cancelled".into()),
        None => Err("capture failed".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_needs_four_numbers() {
        assert_eq!(parse_selection("120,50, 300,400").unwrap(), (120.0, 50.0, 300.0, 400.0));
        assert!(parse_selection("1,2,3").is_err());
        assert!(parse_selection("1,2,3,x").is_err());
    }

    #[test]
    fn view_is_width_by_height() {
        assert_eq!(parse_view("632x960").unwrap(), (632, 960));
        assert!(parse_view("0x960").is_err());
        assert!(parse_view("632").is_err());
    }
}
