//! Operator console: REPL commands and notification printing
//!
//! DMX and MIDI channels are entered and shown 1-based, the way lighting desks and
//! controllers label them. Note and controller numbers stay 0..=127.

use anyhow::{bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use midi_dmx_bridge::decoder::MidiDecoder;
use midi_dmx_bridge::dmx::DmxUniverse;
use midi_dmx_bridge::engine::{EngineHandle, Notification};
use midi_dmx_bridge::learn::LearnState;
use midi_dmx_bridge::mapping::{DmxChannel, MidiTrigger};
use midi_dmx_bridge::midi::{format_hex, MidiMessage};

const PROMPT: &str = "dmx> ";

const HELP: &str = "\
  learn <dmx>                       arm MIDI learn for a DMX channel (1-512)
  cancel                            cancel MIDI learn
  map <dmx> cc|note <ch> <num>      bind a DMX channel by hand (MIDI ch 1-16)
  unmap <dmx>                       remove a binding
  clear                             remove every binding
  list                              show bindings
  status                            learn state, inputs and binding count
  ports                             list MIDI inputs
  attach <port> / detach <port>     open or close a MIDI input
  sim cc|note|off <ch> <num> <val>  inject a MIDI message
  dmx <dmx>                         show a DMX channel's current value
  flush                             write bindings to disk now
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Learn(DmxChannel),
    Cancel,
    Map {
        channel: DmxChannel,
        trigger: MidiTrigger,
    },
    Unmap(DmxChannel),
    Clear,
    List,
    Status,
    Ports,
    Attach(String),
    Detach(String),
    Simulate(MidiMessage),
    ShowDmx(DmxChannel),
    Flush,
    Help,
    Quit,
}

/// Parse one console line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_lowercase().as_str(), args.as_slice()) {
        ("learn", [dmx]) => ConsoleCommand::Learn(parse_dmx(dmx)?),
        ("cancel", []) => ConsoleCommand::Cancel,
        ("map", [dmx, kind, ch, num]) => {
            let channel = parse_dmx(dmx)?;
            let midi_channel = parse_midi_channel(ch)?;
            let number = parse_u8(num, "note/controller")?;
            let trigger = match kind.to_lowercase().as_str() {
                "cc" => MidiTrigger::controller(midi_channel, number)?,
                "note" => MidiTrigger::note(midi_channel, number)?,
                other => bail!("unknown trigger kind '{}', expected cc or note", other),
            };
            ConsoleCommand::Map { channel, trigger }
        }
        ("unmap", [dmx]) => ConsoleCommand::Unmap(parse_dmx(dmx)?),
        ("clear", []) => ConsoleCommand::Clear,
        ("list" | "ls", []) => ConsoleCommand::List,
        ("status", []) => ConsoleCommand::Status,
        ("ports", []) => ConsoleCommand::Ports,
        ("attach", rest) if !rest.is_empty() => ConsoleCommand::Attach(rest.join(" ")),
        ("detach", rest) if !rest.is_empty() => ConsoleCommand::Detach(rest.join(" ")),
        ("sim", [kind, ch, num, value]) => {
            let channel = parse_midi_channel(ch)?;
            let number = parse_u8(num, "note/controller")?;
            let value = parse_u8(value, "value")?;
            let message = match kind.to_lowercase().as_str() {
                "cc" => MidiMessage::ControlChange { channel, controller: number, value },
                "note" if value == 0 => MidiMessage::NoteOff { channel, note: number, velocity: 0 },
                "note" => MidiMessage::NoteOn { channel, note: number, velocity: value },
                "off" => MidiMessage::NoteOff { channel, note: number, velocity: value },
                other => bail!("unknown message kind '{}', expected cc, note or off", other),
            };
            ConsoleCommand::Simulate(message)
        }
        ("dmx", [dmx]) => ConsoleCommand::ShowDmx(parse_dmx(dmx)?),
        ("flush", []) => ConsoleCommand::Flush,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        (verb, _) => bail!("invalid command '{}' (try 'help')", verb),
    };

    Ok(Some(command))
}

fn parse_dmx(text: &str) -> Result<DmxChannel> {
    let number: u16 = text
        .parse()
        .with_context(|| format!("'{}' is not a DMX channel", text))?;
    if number == 0 {
        bail!("DMX channels start at 1");
    }
    Ok(DmxChannel::new(number - 1)?)
}

fn parse_midi_channel(text: &str) -> Result<u8> {
    let number = parse_u8(text, "MIDI channel")?;
    if !(1..=16).contains(&number) {
        bail!("MIDI channel must be 1-16, got {}", number);
    }
    Ok(number - 1)
}

fn parse_u8(text: &str, what: &str) -> Result<u8> {
    let number: u8 = text
        .parse()
        .with_context(|| format!("'{}' is not a valid {}", text, what))?;
    if number > 127 {
        bail!("{} must be 0-127, got {}", what, number);
    }
    Ok(number)
}

/// Read console lines on a dedicated thread.
///
/// The channel closes on Ctrl-D or a read error; Ctrl-C is delivered as `quit`.
pub fn spawn_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let mut editor = DefaultEditor::new()?;
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = tx.send("quit".to_string());
                    break;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        })
        .context("Failed to start console thread")?;

    Ok(rx)
}

/// Executes console commands against the running engine
pub struct Console {
    engine: EngineHandle,
    decoder: MidiDecoder,
    universe: DmxUniverse,
}

impl Console {
    pub fn new(engine: EngineHandle, decoder: MidiDecoder, universe: DmxUniverse) -> Self {
        Self {
            engine,
            decoder,
            universe,
        }
    }

    pub fn decoder_mut(&mut self) -> &mut MidiDecoder {
        &mut self.decoder
    }

    /// Handle one input line. Returns `false` when the operator asked to quit.
    pub async fn handle_line(&mut self, line: &str) -> bool {
        match parse_command(line) {
            Ok(Some(ConsoleCommand::Quit)) => false,
            Ok(Some(command)) => {
                if let Err(e) = self.execute(command).await {
                    println!("{} {}", "error:".red().bold(), e);
                }
                true
            }
            Ok(None) => true,
            Err(e) => {
                println!("{} {}", "error:".red().bold(), e);
                true
            }
        }
    }

    async fn execute(&mut self, command: ConsoleCommand) -> Result<()> {
        debug!("Console command: {:?}", command);
        match command {
            ConsoleCommand::Learn(channel) => {
                self.engine.start_learn(channel, None).await?;
            }
            ConsoleCommand::Cancel => {
                if self.engine.cancel_learn().await?.is_none() {
                    println!("{}", "Not learning".dimmed());
                }
            }
            ConsoleCommand::Map { channel, trigger } => {
                self.engine.set_mapping(channel, trigger).await?;
            }
            ConsoleCommand::Unmap(channel) => {
                if self.engine.remove_mapping(channel).await?.is_none() {
                    println!("{}", format!("DMX {} is not mapped", dmx(channel)).dimmed());
                }
            }
            ConsoleCommand::Clear => {
                self.engine.clear_mappings().await?;
            }
            ConsoleCommand::List => {
                let mappings = self.engine.mappings().await?;
                if mappings.is_empty() {
                    println!("{}", "No mappings".dimmed());
                }
                for mapping in mappings {
                    println!(
                        "  DMX {:>3}  <-  {}",
                        dmx(mapping.channel).bright_white(),
                        mapping.trigger.to_string().cyan()
                    );
                }
            }
            ConsoleCommand::Status => {
                let state = match self.engine.learn_status().await? {
                    LearnState::Idle => "idle".normal(),
                    LearnState::Armed(session) => {
                        format!("learning DMX {}", dmx(session.target)).yellow()
                    }
                };
                let mappings = self.engine.mappings().await?.len();
                println!("  Learn:    {}", state);
                println!("  Mappings: {}", mappings.to_string().green());
                let attached = self.decoder.attached();
                if attached.is_empty() {
                    println!("  Inputs:   {}", "none".dimmed());
                }
                for port in attached {
                    println!("  Input:    {}", port.id.as_str().white());
                }
            }
            ConsoleCommand::Ports => print_ports(&self.decoder.available_ports()?),
            ConsoleCommand::Attach(port) => {
                let handle = self.decoder.attach(&port)?;
                println!("{} {}", "Attached".green(), handle.id);
            }
            ConsoleCommand::Detach(port) => {
                if self.decoder.detach(&port) {
                    println!("{} {}", "Detached".yellow(), port);
                } else {
                    println!("{}", format!("'{}' is not attached", port).dimmed());
                }
            }
            ConsoleCommand::Simulate(message) => self.engine.simulate(message),
            ConsoleCommand::ShowDmx(channel) => {
                println!("  DMX {} = {}", dmx(channel), self.universe.get(channel));
            }
            ConsoleCommand::Flush => {
                self.engine.flush().await?;
                println!("{}", "Mappings written".green());
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}

/// 1-based DMX channel label
fn dmx(channel: DmxChannel) -> String {
    (channel.index() + 1).to_string()
}

pub fn print_ports(ports: &[String]) {
    println!("\n{}", "=== MIDI Inputs ===".bold().cyan());
    if ports.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }
    for (i, name) in ports.iter().enumerate() {
        println!("  {}: {}", i.to_string().yellow(), name.white());
    }
}

/// Print a notification; `verbose` includes raw MIDI and DMX traffic
pub fn print_notification(notification: &Notification, verbose: bool) {
    match notification {
        Notification::MidiMessage(event) => {
            if verbose {
                let text = event.message.to_string();
                let text = match event.message {
                    MidiMessage::NoteOn { .. } => text.bright_green(),
                    MidiMessage::NoteOff { .. } => text.bright_red(),
                    MidiMessage::ControlChange { .. } => text.bright_yellow(),
                    MidiMessage::PitchBend { .. } => text.bright_cyan(),
                    _ => text.normal(),
                };
                println!(
                    "[{}] {:20} | {:8} => {}",
                    event.received_at.format("%H:%M:%S%.3f").to_string().dimmed(),
                    event.source.as_str().white(),
                    format_hex(&event.message.encode()).bright_black(),
                    text
                );
            }
        }
        Notification::DmxWrite(write) => {
            if verbose {
                println!("  {} DMX {} = {}", "->".dimmed(), dmx(write.channel), write.value);
            }
        }
        Notification::LearnStarted { channel, timeout_ms } => println!(
            "{} DMX {}: move a control ({}s)",
            "Learning".yellow().bold(),
            dmx(*channel),
            timeout_ms / 1000
        ),
        Notification::MappingLearned { mapping, superseded } => {
            println!(
                "{} DMX {} <- {}",
                "Learned".green().bold(),
                dmx(mapping.channel),
                mapping.trigger.to_string().cyan()
            );
            print_superseded(superseded);
        }
        Notification::LearnTimedOut { channel } => {
            println!("{} for DMX {}", "Learn timed out".red(), dmx(*channel))
        }
        Notification::LearnCancelled { channel } => {
            println!("{} for DMX {}", "Learn cancelled".yellow(), dmx(*channel))
        }
        Notification::MappingSet { mapping, superseded } => {
            println!(
                "{} DMX {} <- {}",
                "Mapped".green(),
                dmx(mapping.channel),
                mapping.trigger.to_string().cyan()
            );
            print_superseded(superseded);
        }
        Notification::MappingRemoved { channel, trigger } => {
            println!("{} DMX {} ({})", "Unmapped".yellow(), dmx(*channel), trigger)
        }
        Notification::MappingsCleared { count } => {
            println!("{} {} mappings", "Cleared".yellow(), count)
        }
        Notification::PersistenceFailed { error } => {
            println!("{} {}", "Saving mappings failed:".red().bold(), error)
        }
    }
}

fn print_superseded(superseded: &[DmxChannel]) {
    for channel in superseded {
        println!("  {} DMX {} unmapped", "!".yellow(), dmx(*channel));
    }
}
