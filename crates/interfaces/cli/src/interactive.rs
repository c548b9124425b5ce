use std::io;
use std::io::Write;

use anyhow::Result;

use sqlsage_pipeline::Orchestrator;

/// Answer one question and print the result.  Failures print the user-facing
/// message and exit non-zero.
pub(crate) async fn run_ask(orchestrator: &Orchestrator, identity: &str, question: &str) -> Result<bool> {
    match orchestrator.answer(question, identity).await {
        Ok(answer) => {
            println!("{}", answer.text);
            Ok(true)
        }
        Err(err) => {
            eprintln!("{}", err.user_message());
            Ok(false)
        }
    }
}

pub(crate) async fn run_chat(orchestrator: &Orchestrator, identity: &str, bot_name: &str) -> Result<()> {
    println!("{bot_name} chat as `{identity}`");
    println!("commands: /history, /forget, /help, /exit");
    println!("or type any question about your data");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let bytes = stdin.read_line(&mut line)?;
        if bytes == 0 {
            println!("session closed");
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/exit" | "/quit" => {
                println!("session closed");
                break;
            }
            "/help" => {
                println!("/history  -- show what is remembered of this conversation");
                println!("/forget   -- clear this conversation's memory");
                println!("/exit");
                continue;
            }
            "/history" => {
                let history = orchestrator.memory().render_history(identity).await;
                if history.is_empty() {
                    println!("(no conversation yet)");
                } else {
                    println!("{history}");
                }
                continue;
            }
            "/forget" => {
                if orchestrator.memory().forget(identity).await {
                    println!("conversation memory cleared");
                } else {
                    println!("nothing to forget");
                }
                continue;
            }
            _ if line.starts_with('/') => {
                println!("unknown command. use /help");
                continue;
            }
            _ => {}
        }

        match orchestrator.answer(line, identity).await {
            Ok(answer) => println!("{}\n", answer.text),
            Err(err) => println!("{}\n", err.user_message()),
        }
    }

    Ok(())
}
