use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use huddle_chats::{ChannelFeed, Composer, Member, Message, MessageFeed};
use huddle_runtime::ClientServices;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "Type a message and press enter. Commands: /more, /attach <path>, /detach, /help, /quit";

/// Follows `channel_id` and sends whatever is typed on stdin.
pub async fn run(services: &ClientServices, member: Member, channel_id: &str) -> Result<()> {
    let mut feed = ChannelFeed::new(services.store.clone(), services.feed_settings);
    let mut updates = feed.subscribe();
    let channel = feed.open_for(&member, channel_id).await?;
    println!("== {} ==", channel.title_for(Some(&member.id)));

    let mut composer = Composer::new();
    let mut transcript = Transcript::default();
    transcript.print(updates.borrow_and_update().as_ref(), false);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut session = Session {
                    services,
                    feed: &feed,
                    composer: &mut composer,
                    transcript: &mut transcript,
                    member: &member,
                    channel_id: &channel.id,
                };
                if !session.handle_line(line.trim_end()).await {
                    break;
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                transcript.print(updates.borrow_and_update().as_ref(), true);
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        if services.redirected_to_login() {
            println!("Your session expired. Sign in again with `huddle login`.");
            break;
        }
    }

    feed.close().await;
    println!("Goodbye!");
    Ok(())
}

struct Session<'a> {
    services: &'a ClientServices,
    feed: &'a ChannelFeed,
    composer: &'a mut Composer,
    transcript: &'a mut Transcript,
    member: &'a Member,
    channel_id: &'a str,
}

impl Session<'_> {
    /// Returns false when the session should end.
    async fn handle_line(&mut self, line: &str) -> bool {
        let store = self.services.store.as_ref();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => return false,
            ("/help", _) => println!("{HELP}"),
            ("/more", _) => match self.feed.load_more().await {
                Ok(has_older) => {
                    self.transcript.print(self.feed.current().await.as_ref(), false);
                    if !has_older {
                        println!("-- start of the channel --");
                    }
                }
                Err(error) => println!("Could not load earlier messages: {error}"),
            },
            ("/attach", path) if !path.trim().is_empty() => {
                match crate::read_upload(Path::new(path.trim())).await {
                    Ok(upload) => match self.composer.attach(store, upload).await {
                        Ok(url) => println!("Attached {url}"),
                        Err(error) => println!("Upload failed: {error}"),
                    },
                    Err(error) => println!("{error:#}"),
                }
            }
            ("/detach", _) => {
                self.composer.clear_attachment();
                println!("Attachment removed");
            }
            (command, _) if command.starts_with('/') => {
                println!("Unknown command {command}. {HELP}")
            }
            _ => {
                self.composer.set_text(line);
                if let Err(error) = self
                    .composer
                    .send(store, Some(self.member), self.channel_id)
                    .await
                {
                    println!("Message not sent: {error}");
                }
            }
        }
        true
    }
}

fn prompt() {
    print!("> ");
    if let Err(error) = std::io::stdout().flush() {
        debug!(error = %error, "failed to flush prompt");
    }
}

/// Messages already on screen.
#[derive(Debug, Default)]
struct Transcript {
    printed: HashSet<String>,
    oldest: Option<(DateTime<Utc>, String)>,
}

impl Transcript {
    /// Marks unseen messages as shown. Returns the ones older than anything
    /// on screen, then the rest, each oldest first.
    fn take_unseen<'a>(&mut self, feed: &'a MessageFeed) -> (Vec<&'a Message>, Vec<&'a Message>) {
        let boundary = self.oldest.clone();
        let mut earlier = Vec::new();
        let mut later = Vec::new();

        for message in feed.messages().iter().rev() {
            if !self.printed.insert(message.id.clone()) {
                continue;
            }
            let key = (message.created_at, message.id.clone());
            match &boundary {
                Some(oldest) if key < *oldest => earlier.push(message),
                _ => later.push(message),
            }
            if self.oldest.as_ref().map_or(true, |oldest| key < *oldest) {
                self.oldest = Some(key);
            }
        }
        (earlier, later)
    }

    /// Prints unseen messages. Older pages go under their own header since
    /// newer messages are already above them.
    fn print(&mut self, feed: Option<&MessageFeed>, after_prompt: bool) {
        let Some(feed) = feed else {
            return;
        };
        let (earlier, later) = self.take_unseen(feed);
        if after_prompt && !(earlier.is_empty() && later.is_empty()) {
            println!();
        }
        if !earlier.is_empty() {
            println!("-- earlier messages --");
            for message in earlier {
                println!("{}", render(message));
            }
            println!("-- end of earlier messages --");
        }
        for message in later {
            println!("{}", render(message));
        }
    }
}
