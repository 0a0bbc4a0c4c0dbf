//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of maildir-uidlist.
//
// maildir-uidlist is free software: you can  redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// maildir-uidlist is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// maildir-uidlist. If not, see <http://www.gnu.org/licenses/>.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use regex::Regex;
use structopt::StructOpt;

use crate::maildir::folder::MaildirFolder;
use crate::maildir::message_name::MessageName;
use crate::maildir::uid_list::Uid;
use crate::support::config::MaildirConfig;
use crate::support::error::Error;
use crate::support::sysexits::*;

/// Inspect and maintain the UID list of a maildir.
///
/// The UID list assigns each message a number which stays the same while
/// the message file is renamed to change its flags. Message files placed in
/// `cur` or `new` by other programs are picked up automatically the next
/// time any command looks at the maildir.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// TOML file with maildir settings (file names, locking, permissions).
    #[structopt(long, short, parse(from_os_str))]
    config: Option<PathBuf>,

    /// log4rs configuration file. Without one, warnings and errors are
    /// written to standard error.
    #[structopt(long, parse(from_os_str))]
    log_config: Option<PathBuf>,

    /// Also log informational and debugging messages to standard error.
    /// Ignored if --log-config is given.
    #[structopt(long, short)]
    verbose: bool,

    /// The root directory of the maildir, containing `cur`, `new`, and
    /// `tmp`.
    #[structopt(parse(from_os_str))]
    maildir: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Create the maildir if it does not exist, and assign UIDs to any
    /// messages already in it.
    Init,
    /// Show the UID validity, last UID, message count, and highest
    /// modification sequence.
    Status,
    List(ListSubcommand),
    /// List the messages in `new`.
    Recent,
    /// Assign the next UID to a message file just moved into `cur` or `new`.
    ///
    /// If the message already had a UID, it moves to the new one.
    Append {
        /// The file name of the message, without directory.
        name: String,
    },
    /// Record that the message with the given UID has been renamed.
    ///
    /// This only updates the UID list; the file must be renamed separately.
    Update {
        #[structopt(parse(try_from_str = parse_uid))]
        uid: Uid,
        /// The new file name of the message, without directory.
        name: String,
    },
    /// Delete the message with the given UID and forget its UID.
    Delete {
        #[structopt(parse(try_from_str = parse_uid))]
        uid: Uid,
    },
    /// Replace the UID validity, which invalidates every UID any client has
    /// seen.
    ResetValidity {
        /// The new UID validity [default: current time in milliseconds]
        value: Option<u64>,
    },
}

/// List messages and their UIDs in ascending UID order.
#[derive(StructOpt)]
struct ListSubcommand {
    /// Only list messages with at least this UID.
    #[structopt(long)]
    from: Option<u64>,

    /// Only list messages with at most this UID.
    #[structopt(long)]
    to: Option<u64>,

    /// Only list messages whose file name matches this regular expression.
    #[structopt(long = "match", short)]
    pattern: Option<Regex>,

    /// List at most this many messages, starting from the lowest UID.
    #[structopt(long, short, conflicts_with_all = &["from", "to"])]
    limit: Option<usize>,
}

fn parse_uid(s: &str) -> Result<Uid, String> {
    s.parse::<u64>()
        .ok()
        .and_then(Uid::of)
        .ok_or_else(|| format!("Invalid UID: {}", s))
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            }
        });

    init_logging(options.log_config.as_deref(), options.verbose);

    let config = match options.config {
        Some(ref path) => match MaildirConfig::load(path) {
            Ok(config) => config,
            Err(e) => die!(EX_CONFIG, "Error in config file: {}", e),
        },
        None => MaildirConfig::default(),
    };

    let folder = MaildirFolder::open(options.maildir, &config);
    if !matches!(options.command, Command::Init) && !folder.exists() {
        die!(
            EX_NOINPUT,
            "'{}' is not a maildir; use the `init` command to create one",
            folder.root().display()
        );
    }

    if let Err(e) = run(&folder, options.command) {
        eprintln!("{}", e);
        Sysexit::for_error(&e).exit();
    }
}

fn init_logging(log_config: Option<&Path>, verbose: bool) {
    if let Some(log_config) = log_config {
        if let Err(e) =
            log4rs::init_file(log_config, log4rs::file::Deserializers::new())
        {
            die!(
                EX_CONFIG,
                "Error in log configuration '{}': {}",
                log_config.display(),
                e
            );
        }
        return;
    }

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {m}{n}",
        )))
        .build();
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    let config = match Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
    {
        Ok(config) => config,
        Err(e) => die!(EX_SOFTWARE, "Failed to configure logging: {}", e),
    };

    if let Err(e) = log4rs::init_config(config) {
        die!(EX_SOFTWARE, "Failed to initialise logging: {}", e);
    }
}

fn run(folder: &MaildirFolder, command: Command) -> Result<(), Error> {
    match command {
        Command::Init => {
            folder.create()?;
            let count = folder.get_message_count()?;
            println!(
                "{}: {} messages, UID validity {}",
                folder.root().display(),
                count,
                folder.get_uid_validity()?
            );
        }

        Command::Status => {
            println!("UID validity:    {}", folder.get_uid_validity()?);
            match folder.get_last_uid()? {
                Some(uid) => println!("Last UID:        {}", uid),
                None => println!("Last UID:        none"),
            }
            println!("Messages:        {}", folder.get_message_count()?);
            println!("Highest modseq:  {}", folder.get_highest_mod_seq()?);
        }

        Command::List(cmd) => {
            let pattern = cmd.pattern;
            let filter = |name: &str| {
                pattern.as_ref().map_or(true, |p| p.is_match(name))
            };

            let messages = if cmd.limit.is_some() {
                folder.get_uid_map_limited(filter, cmd.limit)?
            } else {
                folder.get_uid_map_filtered(
                    filter,
                    cmd.from.unwrap_or(0),
                    cmd.to,
                )?
            };
            print_messages(&messages);
        }

        Command::Recent => {
            print_messages(&folder.get_recent_messages()?);
        }

        Command::Append { name } => {
            println!("{}", folder.append_message(&name)?);
        }

        Command::Update { uid, name } => {
            folder.update(uid, &name)?;
        }

        Command::Delete { uid } => {
            println!("{}", folder.delete(uid)?);
        }

        Command::ResetValidity { value } => {
            let value = value.unwrap_or_else(|| {
                chrono::Utc::now().timestamp_millis() as u64
            });
            folder.set_uid_validity(value)?;
            println!("{}", value);
        }
    }

    Ok(())
}

fn print_messages(messages: &BTreeMap<Uid, MessageName>) {
    for (uid, name) in messages {
        println!("{} {}", uid, name);
    }
}
