//! Stand-in engine speaking the worker side of the control protocol.
//!
//! Behaviour is scripted with `--steps`, a `;`-separated list:
//!
//! - `hello[:VERSION]` blocking handshake, `announce[:VERSION]` non-blocking one
//! - `send:RECORDS` / `block:RECORDS` message, records split by `|`, units by `,`
//! - `partial:RECORDS` one message written in two chunks
//! - `raw:HEX` bytes written verbatim
//! - `argv` send the full argument vector as `argv` message
//! - `sleep:MS`, `pause` (wait for a signal), `abort`, `exit:CODE`
//!
//! `--worker-steps I=STEPS` overrides the script for the worker started with
//! `--proc-num-offset=I`.

use std::fs::File;
use std::io::Write;
use std::os::fd::{FromRawFd, RawFd};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nix::sys::signal::{SigSet, Signal};
use warden_ipc::{encode, Message, Record, IPC_PROTOCOL_VERSION};

#[derive(Parser, Debug)]
#[command(name = "warden-mock-engine", disable_version_flag = true)]
struct Args {
    /// Control channel descriptors
    #[arg(long, value_name = "W,R")]
    pipe_fd: Option<String>,

    #[arg(long, value_name = "I")]
    proc_num_offset: Option<usize>,

    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Version announced by `hello` and `announce`
    #[arg(long, value_name = "V")]
    version: Option<String>,

    #[arg(long, value_name = "STEPS")]
    steps: Option<String>,

    #[arg(long, value_name = "I=STEPS")]
    worker_steps: Vec<String>,

    /// Ordinary engine arguments, ignored
    rest: Vec<String>,
}

#[derive(Debug)]
enum Step {
    Hello { version: Option<String>, blocking: bool },
    Send { records: Vec<Record>, blocking: bool },
    Partial(Vec<Record>),
    Raw(Vec<u8>),
    Argv,
    Sleep(u64),
    Pause,
    Abort,
    Exit(i32),
}

fn parse_records(text: &str) -> Vec<Record> {
    text.split('|')
        .map(|record| Record::from_units(record.split(',').map(str::to_string).collect()))
        .collect()
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        bail!("odd number of hex digits in {}", hex);
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).context("invalid hex"))
        .collect()
}

fn parse_step(step: &str) -> Result<Step> {
    let (name, arg) = match step.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (step, None),
    };
    let required = || arg.with_context(|| format!("step {} needs an argument", name));

    Ok(match name {
        "hello" | "announce" => Step::Hello {
            version: arg.map(str::to_string),
            blocking: name == "hello",
        },
        "send" | "block" => Step::Send {
            records: parse_records(required()?),
            blocking: name == "block",
        },
        "partial" => Step::Partial(parse_records(required()?)),
        "raw" => Step::Raw(parse_hex(required()?)?),
        "argv" => Step::Argv,
        "sleep" => Step::Sleep(required()?.parse()?),
        "pause" => Step::Pause,
        "abort" => Step::Abort,
        "exit" => Step::Exit(required()?.parse()?),
        other => bail!("unknown step {}", other),
    })
}

struct Channel {
    out: File,
    _input: File,
    ack: SigSet,
}

impl Channel {
    fn send(&mut self, message: &Message) -> Result<()> {
        let frame = encode(message)?;
        self.out.write_all(&frame)?;
        if message.blocking {
            // SIGUSR2 is blocked, so an early ack stays pending until here
            self.ack.wait()?;
        }
        Ok(())
    }
}

fn open_channel(fds: &str) -> Result<Channel> {
    let (write, read) = fds
        .split_once(',')
        .with_context(|| format!("malformed --pipe-fd {}", fds))?;
    let write: RawFd = write.parse()?;
    let read: RawFd = read.parse()?;

    let mut ack = SigSet::empty();
    ack.add(Signal::SIGUSR2);
    ack.thread_block()?;

    // SAFETY: the launcher hands these descriptors to us and nothing else owns them
    let (out, input) = unsafe { (File::from_raw_fd(write), File::from_raw_fd(read)) };
    Ok(Channel {
        out,
        _input: input,
        ack,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let worker = args.proc_num_offset.unwrap_or(0);
    let script = args
        .worker_steps
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .find(|(index, _)| index.parse::<usize>().ok() == Some(worker))
        .map(|(_, steps)| steps.to_string())
        .or(args.steps.clone())
        .unwrap_or_default();

    let steps = script
        .split(';')
        .filter(|s| !s.is_empty())
        .map(parse_step)
        .collect::<Result<Vec<_>>>()?;

    let mut channel = open_channel(args.pipe_fd.as_deref().context("missing --pipe-fd")?)?;
    let version = args
        .version
        .clone()
        .unwrap_or_else(|| IPC_PROTOCOL_VERSION.to_string());

    for step in steps {
        match step {
            Step::Hello { version: v, blocking } => {
                let mut handshake = Message::handshake(v.as_deref().unwrap_or(&version));
                handshake.blocking = blocking;
                channel.send(&handshake)?;
            }
            Step::Send { records, blocking } => {
                let message = if blocking {
                    Message::blocking(records)
                } else {
                    Message::new(records)
                };
                channel.send(&message)?;
            }
            Step::Partial(records) => {
                let frame = encode(&Message::new(records))?;
                let (head, tail) = frame.split_at(frame.len() / 2);
                channel.out.write_all(head)?;
                channel.out.flush()?;
                std::thread::sleep(Duration::from_millis(20));
                channel.out.write_all(tail)?;
            }
            Step::Raw(bytes) => channel.out.write_all(&bytes)?,
            Step::Argv => {
                let mut records = vec![Record::from("argv")];
                records.extend(std::env::args().map(Record::from));
                channel.send(&Message::new(records))?;
            }
            Step::Sleep(ms) => std::thread::sleep(Duration::from_millis(ms)),
            Step::Pause => {
                nix::unistd::pause();
            }
            Step::Abort => std::process::abort(),
            Step::Exit(code) => std::process::exit(code),
        }
    }

    if let Some(threads) = args.threads {
        eprintln!("mock engine ran with {} threads", threads);
    }
    Ok(())
}
