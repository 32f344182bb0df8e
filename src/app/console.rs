use anyhow::Result;
use tenax::{InboundContext, Router, UserProfile};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::warn;

const CHANNEL: &str = "console";

/// Read messages from stdin until EOF or `/quit`, printing every reply.
pub async fn run(router: &Router, user: &UserProfile) -> Result<()> {
    let inbound = InboundContext::new(CHANNEL);
    let stdin = io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    println!("Tenax is listening. Type /quit to leave.");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        match router.handle_message(user, &inbound, line).await {
            Ok(outcome) => {
                for reply in outcome.replies {
                    println!("{reply}\n");
                }
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "message handling failed");
                println!("Sorry, something went wrong on my side. Please try again.\n");
            }
        }
    }
    Ok(())
}
