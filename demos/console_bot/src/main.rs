//! Console Bot
//!
//! Every line typed on stdin becomes a `CREATE` event from the user `you`
//! in channel `console`. Prefix a line with `dm ` to send it as a direct
//! message instead. Replies are printed to stdout.
//!
//! # Commands
//!
//! ```text
//! .ping              pong, with a 5 second per-user cooldown
//! .echo <text>       repeat the text (also works in DMs)
//! .quiz              ask a question and wait 15 seconds for the answer
//! .boom              panic; the bot apologizes and keeps running
//! .toggle <command>  enable or disable a `fun` command (owner only)
//! ```
//!
//! A passive in the `stats` module counts every message and greets lines
//! starting with "hello".
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use bronze::core::{ApiResult, MessageId};
use bronze::prelude::*;
use bronze::runtime::config::ConfigLoader;
use tokio::io::{AsyncBufReadExt, BufReader};

const USER: &str = "you";
const CHANNEL: &str = "console";
const GUILD: &str = "local";

// ============================================================================
// Console Responder
// ============================================================================

/// Prints replies to stdout and grants everyone ordinary member permissions.
#[derive(Default)]
struct ConsoleResponder {
    next_id: AtomicU64,
}

#[async_trait]
impl Responder for ConsoleResponder {
    async fn reply(&self, origin: &Origin, reply: Reply) -> ApiResult<MessageId> {
        let place = if origin.is_direct() { "dm" } else { CHANNEL };
        match reply {
            Reply::Text(text) => println!("[{place}] bot: {text}"),
            Reply::Embed(embed) => println!("[{place}] bot: {embed:?}"),
            Reply::File { name, data } => {
                println!("[{place}] bot: <file {name}, {} bytes>", data.len())
            }
        }
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed).to_string())
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> ApiResult<()> {
        println!("(message {message_id} deleted)");
        Ok(())
    }

    async fn author_permissions(&self, _origin: &Origin) -> ApiResult<Permissions> {
        Ok(Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNEL)
    }

    async fn bot_permissions(&self, _channel_id: &str) -> ApiResult<Permissions> {
        Ok(Permissions::all())
    }
}

// ============================================================================
// Modules
// ============================================================================

fn fun_module() -> Result<Module> {
    let module = Module::new("fun")
        .description("Small toys")
        .with_command(
            Command::new("ping")
                .trigger(".ping")
                .cooldown(Duration::from_secs(5), CooldownScope::User)
                .handler(|ctx: Context| async move {
                    ctx.reply("pong").await?;
                    Ok::<_, BoxError>(())
                }),
        )?
        .with_command(
            Command::new("echo")
                .trigger(".echo")
                .allow_dms(true)
                .handler(|ctx: Context| async move {
                    let text = ctx.rest();
                    if text.is_empty() {
                        ctx.reply("usage: .echo <text>").await?;
                    } else {
                        ctx.reply(text).await?;
                    }
                    Ok::<_, BoxError>(())
                }),
        )?
        .with_command(
            Command::new("quiz")
                .trigger(".quiz")
                .cooldown(Duration::from_secs(20), CooldownScope::Channel)
                .handler(|ctx: Context| async move {
                    ctx.reply("What is 6 × 7? You have 15 seconds.").await?;
                    match ctx.wait_for_reply(Duration::from_secs(15)).await? {
                        Some(answer) if answer.content() == "42" => {
                            ctx.reply("Correct!").await?;
                        }
                        Some(answer) => {
                            ctx.reply(format!("{} is wrong, it was 42.", answer.content()))
                                .await?;
                        }
                        None => {
                            ctx.reply("Time's up, it was 42.").await?;
                        }
                    }
                    Ok::<_, BoxError>(())
                }),
        )?
        .with_command(Command::new("boom").trigger(".boom").handler(
            |ctx: Context| async move {
                if ctx.content().starts_with(".boom") {
                    panic!("boom requested from the console");
                }
                Ok::<_, BoxError>(())
            },
        ))?;
    Ok(module)
}

fn admin_module(dispatcher: Dispatcher) -> Result<Module> {
    let module = Module::new("admin").with_command(
        Command::new("toggle")
            .trigger(".toggle")
            .owner_only(true)
            .handler(move |ctx: Context| {
                let dispatcher = dispatcher.clone();
                async move {
                    let Some(name) = ctx.arg(0) else {
                        ctx.reply("usage: .toggle <command>").await?;
                        return Ok(());
                    };
                    let fun = dispatcher.module("fun")?;
                    let Some(command) = fun.command(name) else {
                        ctx.reply(format!("no command named {name}")).await?;
                        return Ok(());
                    };
                    let enabled = !command.is_enabled();
                    dispatcher.set_command_enabled("fun", name, enabled)?;
                    let state = if enabled { "enabled" } else { "disabled" };
                    ctx.reply(format!("{name} is now {state}")).await?;
                    Ok::<_, BoxError>(())
                }
            }),
    )?;
    Ok(module)
}

fn stats_module() -> Result<Module> {
    let seen = Arc::new(AtomicU64::new(0));
    let module = Module::new("stats").with_passive(
        Passive::new("counter")
            .allow_dms(true)
            .handler(move |ctx: Context| {
                let seen = seen.clone();
                async move {
                    let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(count, "Message counted");
                    if ctx.content().to_lowercase().starts_with("hello") {
                        ctx.reply(format!("hello! that was message #{count}")).await?;
                    }
                    Ok::<_, BoxError>(())
                }
            }),
    )?;
    Ok(module)
}

// ============================================================================
// Input
// ============================================================================

/// Turns stdin lines into events until EOF.
async fn read_console(sender: EventSender, responder: BoxedResponder) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let (origin, content) = match line.strip_prefix("dm ") {
            Some(rest) => (Origin::direct(format!("dm-{USER}"), USER), rest.to_string()),
            None => (Origin::guild(CHANNEL, GUILD, USER), line),
        };
        if content.trim().is_empty() {
            continue;
        }
        sender
            .send(Event::new(EventKind::CREATE, origin, content, responder.clone()))
            .await?;
    }
    info!("stdin closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ConfigLoader::new().with_current_dir().load()?;
    if config.bot.owners.is_empty() {
        config.bot.owners.push(USER.to_string());
    }

    let runtime = BronzeRuntime::from_config(config)?;
    let dispatcher = runtime.dispatcher();
    dispatcher.register_module(fun_module()?)?;
    dispatcher.register_module(admin_module(dispatcher.clone())?)?;
    dispatcher.register_module(stats_module()?)?;

    println!("Type .ping, .echo hi, .quiz, .boom or .toggle ping. Ctrl+D to quit.");

    let responder: BoxedResponder = Arc::new(ConsoleResponder::default());
    let reader = tokio::spawn(read_console(runtime.sender(), responder));

    runtime
        .run_until(async {
            tokio::select! {
                result = reader => match result {
                    Ok(Err(err)) => error!(error = %err, "Console reader failed"),
                    Err(err) => error!(error = %err, "Console reader panicked"),
                    Ok(Ok(())) => {}
                },
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
            }
            // Let handlers started by the last line finish printing.
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await?;

    Ok(())
}
