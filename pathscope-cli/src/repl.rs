//! Interactive REPL.

use crate::commands::{self, format_welcome};
use crate::Commands;
use colored::Colorize;
use pathscope_client::{Client, ConnectionConfig};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  info                          Show render information
  samples <n>                   Set the sample count
  render                        Render the full image
  scene [idle_ms]               Fetch camera and scene objects
  pixel <x> <y> [n] [json]      Trace one pixel
  plugins                       List announced plugins

  disconnect, exit              Leave the session (server keeps running)
  quit                          Stop the server and exit
"#;

/// What the REPL should do with a line.
#[derive(Debug, PartialEq)]
enum Action {
    Run(Commands),
    Print(String),
    Disconnect,
    Quit,
}

pub async fn run(config: ConnectionConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "pathscope CLI".bold().cyan());
    println!("Connecting to {}...", config.addr);

    let mut client = Client::connect_with(config).await?;
    println!("{}", "Connected!".green());
    println!("{}", format_welcome(client.welcome()));

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".pathscope_history"))
        .unwrap_or_else(|_| ".pathscope_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    let mut quit = false;
    loop {
        let prompt = format!("{} ", "pathscope>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => match parse_line(&line) {
                Ok(None) => continue,
                Ok(Some(Action::Print(text))) => println!("{}", text),
                Ok(Some(Action::Disconnect)) => break,
                Ok(Some(Action::Quit)) => {
                    quit = true;
                    break;
                }
                Ok(Some(Action::Run(cmd))) => match commands::execute(&mut client, cmd).await {
                    Ok(output) => println!("{}\n", output),
                    Err(e) => {
                        println!("{}: {}\n", "Error".red(), e);
                        if is_session_over(e.as_ref()) {
                            let _ = rl.save_history(&history_path);
                            return Ok(());
                        }
                    }
                },
                Err(usage) => println!("{}\n", usage.yellow()),
            },
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    if quit {
        client.quit().await?;
        println!("{}", "Server stopped.".dimmed());
    } else {
        let _ = client.disconnect().await;
        println!("{}", "Disconnected.".dimmed());
    }
    Ok(())
}

fn is_session_over(err: &(dyn std::error::Error + 'static)) -> bool {
    err.downcast_ref::<pathscope_client::ClientError>()
        .is_some_and(|e| e.is_fatal())
}

/// Parses one REPL line. `Err` carries a usage message.
fn parse_line(line: &str) -> Result<Option<Action>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return Ok(None);
    };
    let cmd = first.to_lowercase();
    let args = &parts[1..];

    let action = match cmd.as_str() {
        "help" | "?" => Action::Print(HELP_TEXT.to_string()),
        "exit" | "disconnect" | "q" => Action::Disconnect,
        "quit" => Action::Quit,
        "info" | "i" => Action::Run(Commands::Info),
        "render" | "r" => Action::Run(Commands::Render),
        "plugins" => Action::Run(Commands::Plugins),
        "samples" | "s" => {
            let count = args
                .first()
                .and_then(|n| n.parse().ok())
                .ok_or("Usage: samples <n>")?;
            Action::Run(Commands::Samples { count })
        }
        "scene" => {
            let idle_ms = match args.first() {
                Some(ms) => ms.parse().map_err(|_| "Usage: scene [idle_ms]")?,
                None => 200,
            };
            Action::Run(Commands::Scene { idle_ms })
        }
        "pixel" | "p" => {
            const USAGE: &str = "Usage: pixel <x> <y> [n] [json]";
            let json = args.last() == Some(&"json");
            let numbers = if json { &args[..args.len() - 1] } else { args };
            let parsed: Vec<i32> = numbers
                .iter()
                .map(|n| n.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| USAGE)?;
            match parsed.as_slice() {
                [x, y] => Action::Run(Commands::Pixel {
                    x: *x,
                    y: *y,
                    samples: 1,
                    json,
                }),
                [x, y, samples] => Action::Run(Commands::Pixel {
                    x: *x,
                    y: *y,
                    samples: *samples,
                    json,
                }),
                _ => return Err(USAGE.to_string()),
            }
        }
        other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
    };
    Ok(Some(action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pixel() {
        assert_eq!(
            parse_line("pixel 10 20 4").unwrap(),
            Some(Action::Run(Commands::Pixel {
                x: 10,
                y: 20,
                samples: 4,
                json: false
            }))
        );
        assert_eq!(
            parse_line("p 1 2 json").unwrap(),
            Some(Action::Run(Commands::Pixel {
                x: 1,
                y: 2,
                samples: 1,
                json: true
            }))
        );
        assert!(parse_line("pixel 1").is_err());
        assert!(parse_line("pixel a b").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(
            parse_line("samples 32").unwrap(),
            Some(Action::Run(Commands::Samples { count: 32 }))
        );
        assert_eq!(
            parse_line("scene").unwrap(),
            Some(Action::Run(Commands::Scene { idle_ms: 200 }))
        );
        assert_eq!(parse_line("QUIT").unwrap(), Some(Action::Quit));
        assert_eq!(parse_line("exit").unwrap(), Some(Action::Disconnect));
        assert!(parse_line("samples").is_err());
        assert!(parse_line("frobnicate").unwrap_err().contains("frobnicate"));
    }
}
