use std::io;
use std::io::IsTerminal;
use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::Local;

use sqlsage_memory::{ConversationTurn, SessionLog};

pub(crate) async fn run_history_show(log: &SessionLog, identity: Option<&str>, limit: usize) -> Result<()> {
    let Some(identity) = identity else {
        let identities = log.identities().await?;
        if identities.is_empty() {
            println!("no recorded sessions in {}", log.dir().display());
            return Ok(());
        }
        println!("── recorded sessions ────────────────────────────────");
        for identity in identities {
            println!("  {identity}");
        }
        return Ok(());
    };

    let turns = log.load_recent(identity, limit).await?;
    if turns.is_empty() {
        println!("no recorded turns for `{identity}`");
        return Ok(());
    }
    println!("── last {} turns for {identity} ──────────────────────", turns.len());
    for turn in &turns {
        print_turn(turn);
    }
    Ok(())
}

fn print_turn(turn: &ConversationTurn) {
    let at = turn.at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    println!("[{at}] Human: {}", turn.query);
    println!("[{at}] AI: {}", turn.response);
    println!();
}

pub(crate) async fn run_history_clear(log: &SessionLog, identity: &str, yes: bool) -> Result<()> {
    if !yes {
        if !io::stdin().is_terminal() {
            bail!("refusing to clear history in non-interactive mode without --yes");
        }

        print!("This permanently deletes the recorded session of `{identity}`. Type 'CLEAR' to continue: ");
        io::stdout().flush()?;
        let mut confirmation = String::new();
        io::stdin().read_line(&mut confirmation)?;
        if confirmation.trim() != "CLEAR" {
            println!("history clear cancelled");
            return Ok(());
        }
    }

    if log.clear(identity).await? {
        println!("session history of `{identity}` cleared");
    } else {
        println!("no recorded session for `{identity}`");
    }
    Ok(())
}

pub(crate) async fn run_history_export(log: &SessionLog, identity: &str, dest: &Path) -> Result<()> {
    log.export(identity, dest).await?;
    println!("history of `{identity}` exported to {}", dest.display());
    Ok(())
}
