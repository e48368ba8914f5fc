//! glyphfs console.
//!
//! A line-oriented console over a [`Runtime`]: plain VFS commands (`ls`,
//! `cat`, `write`, ...) plus overlay commands that take UCFS or PXFS logical
//! paths (`uc-write [🌍]notes[🌍]todo.txt buy milk`). Type `help` for the
//! full list.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use glyphfs_kernel::codec::LogicalPath;
use glyphfs_kernel::{EntryKind, FsError, FsResult, Overlay, Runtime, RuntimeConfig};

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "glyphfs", version, about = "Console over a glyphfs VFS")]
pub struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/glyphfs/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// FAT32 image to load into a ramdisk and mount
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Where to mount --image
    #[arg(long, default_value = "/fat")]
    pub mount: String,

    /// Run these console commands and exit instead of starting the console
    #[arg(short = 'c', long = "command")]
    pub commands: Vec<String>,
}

/// Default config file location.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "glyphfs").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn history_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "glyphfs").map(|dirs| dirs.data_dir().join("history.txt"))
}

/// Build the runtime configuration from the arguments.
///
/// An explicit `--config` must exist; a missing default config file means
/// defaults.
pub fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => match config_path() {
            Some(path) if path.exists() => RuntimeConfig::load(&path)?,
            _ => {
                tracing::debug!("No config file, using defaults");
                RuntimeConfig::default()
            }
        },
    };

    Ok(match &args.image {
        Some(image) => config.with_fat32_image("image0", image.clone(), &args.mount),
        None => config,
    })
}

/// `ENOENT: not found: /x`
pub fn describe(err: &FsError) -> String {
    format!("{}: {}", err.errno(), err)
}

const HELP_TEXT: &str = r#"glyphfs console commands:
  mounts                     List mount points
  devices                    List block devices
  ls [PATH]                  List a directory (default /)
  cat PATH                   Print a file
  write PATH TEXT            Create or overwrite a file
  append PATH TEXT           Append to a file
  mkdir PATH                 Create a directory
  rm [-r] PATH               Remove a file or directory
  stat PATH                  Show type and size
  uc-write|uc-append|uc-cat|uc-exists
                             As above, with a UCFS path: [🌍]a[🌍]b
  px-write|px-append|px-cat|px-exists
                             As above, with a PXFS path: {255,0,0}a{255,0,0}b
  canon LOGICAL              Show the canonical VFS path
  prompt CANONICAL           Show the logical form of a canonical path
  help                       This text
  exit                       Leave the console
"#;

/// Split off the first whitespace-delimited word.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim_start()),
        None => (input, ""),
    }
}

fn usage(text: &str) -> FsError {
    FsError::InvalidArgument(format!("usage: {}", text))
}

fn required<'a>(arg: &'a str, text: &str) -> FsResult<&'a str> {
    if arg.is_empty() { Err(usage(text)) } else { Ok(arg) }
}

/// Console state.
pub struct Console {
    runtime: Runtime,
    finished: bool,
}

impl Console {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            finished: false,
        }
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// True once `exit` has been entered.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Process a single line of input.
    pub fn process_line(&mut self, line: &str) -> FsResult<Option<String>> {
        let (command, rest) = split_word(line);
        let rt = &mut self.runtime;

        let output = match command {
            "" => return Ok(None),
            "help" | "?" => HELP_TEXT.trim_end().to_string(),
            "exit" | "quit" => {
                self.finished = true;
                return Ok(None);
            }
            "mounts" => rt
                .vfs
                .mounts()
                .iter()
                .map(|m| {
                    let mode = if m.read_only { "ro" } else { "rw" };
                    format!("{:<16} {:<8} {}", m.path, m.driver, mode)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            "devices" => rt
                .registry
                .devices()
                .map(|d| {
                    format!(
                        "{:<16} {} x {} bytes",
                        d.name(),
                        d.block_count(),
                        d.block_size()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            "ls" => {
                let path = if rest.is_empty() { "/" } else { rest };
                let mut entries = rt.vfs.list(path)?;
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                entries
                    .iter()
                    .map(|e| match e.kind {
                        EntryKind::Directory => format!("{}/", e.name),
                        EntryKind::File => format!("{:<24} {}", e.name, e.size),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            "cat" => {
                let contents = rt.vfs.read_to_vec(required(rest, "cat PATH")?)?;
                String::from_utf8_lossy(&contents).into_owned()
            }
            "write" | "append" => {
                let (path, text) = split_word(rest);
                let path = required(path, "write PATH TEXT")?;
                if command == "write" {
                    rt.vfs.write_file(path, text.as_bytes())?;
                } else {
                    rt.vfs.append_file(path, text.as_bytes())?;
                }
                return Ok(None);
            }
            "mkdir" => {
                rt.vfs.mkdir(required(rest, "mkdir PATH")?)?;
                return Ok(None);
            }
            "rm" => {
                let (flag, path) = split_word(rest);
                let (recursive, path) = if flag == "-r" { (true, path) } else { (false, rest) };
                rt.vfs.remove(required(path, "rm [-r] PATH")?, recursive)?;
                return Ok(None);
            }
            "stat" => {
                let path = required(rest, "stat PATH")?;
                match rt.vfs.file_type(path) {
                    Some(EntryKind::Directory) => "directory".to_string(),
                    Some(EntryKind::File) => {
                        let size = rt.vfs.read_file(path, &mut [])?;
                        format!("file, {} bytes", size)
                    }
                    None => return Err(FsError::NotFound(path.to_string())),
                }
            }
            "uc-write" | "uc-append" => {
                overlay_write(&rt.ucfs, &mut rt.vfs, command == "uc-append", rest)?;
                return Ok(None);
            }
            "px-write" | "px-append" => {
                overlay_write(&rt.pxfs, &mut rt.vfs, command == "px-append", rest)?;
                return Ok(None);
            }
            "uc-cat" => {
                let contents = rt.ucfs.read_to_vec(&mut rt.vfs, required(rest, "uc-cat LOGICAL")?)?;
                String::from_utf8_lossy(&contents).into_owned()
            }
            "px-cat" => {
                let contents = rt.pxfs.read_to_vec(&mut rt.vfs, required(rest, "px-cat LOGICAL")?)?;
                String::from_utf8_lossy(&contents).into_owned()
            }
            "uc-exists" => rt.ucfs.exists(&mut rt.vfs, rest).to_string(),
            "px-exists" => rt.pxfs.exists(&mut rt.vfs, rest).to_string(),
            "canon" => {
                let logical = required(rest, "canon LOGICAL")?;
                if logical.starts_with('{') {
                    rt.pxfs.canonical_path(logical)?
                } else {
                    rt.ucfs.canonical_path(logical)?
                }
            }
            "prompt" => {
                let canonical = required(rest, "prompt CANONICAL")?;
                let uc = rt.ucfs.prompt_form(canonical);
                if uc != canonical {
                    uc
                } else {
                    rt.pxfs.prompt_form(canonical)
                }
            }
            other => {
                return Err(FsError::NotSupported(format!(
                    "unknown command {:?}, type help",
                    other
                )));
            }
        };
        Ok(Some(output))
    }
}

fn overlay_write<P: LogicalPath>(
    overlay: &Overlay<P>,
    vfs: &mut glyphfs_kernel::Vfs,
    append: bool,
    rest: &str,
) -> FsResult<()> {
    let (logical, text) = split_word(rest);
    let logical = required(logical, "uc-write|px-write LOGICAL TEXT")?;
    if append {
        overlay.append_file(vfs, logical, text.as_bytes())
    } else {
        overlay.write_file(vfs, logical, text.as_bytes())
    }
}

/// Build the runtime and run commands or the interactive console.
pub fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let runtime = Runtime::new(&config)?;
    let mut console = Console::new(runtime);

    if !args.commands.is_empty() {
        for line in &args.commands {
            match console.process_line(line) {
                Ok(Some(output)) => println!("{}", output),
                Ok(None) => {}
                Err(e) => anyhow::bail!("{}: {}", line, describe(&e)),
            }
        }
        return Ok(());
    }

    interactive(&mut console)
}

fn interactive(console: &mut Console) -> Result<()> {
    println!("glyphfs v{}", env!("CARGO_PKG_VERSION"));
    println!("Type help for commands, exit to leave.\n");

    let mut rl = DefaultEditor::new().context("Failed to create editor")?;

    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    while !console.finished() {
        match rl.readline("glyphfs> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match console.process_line(&line) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", describe(&e)),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console() -> Console {
        Console::new(Runtime::new(&RuntimeConfig::default()).unwrap())
    }

    #[test]
    fn split_word_keeps_text_intact() {
        assert_eq!(split_word("write /a hello  world"), ("write", "/a hello  world"));
        assert_eq!(split_word("  ls"), ("ls", ""));
        assert_eq!(split_word(""), ("", ""));
    }

    #[test]
    fn write_then_cat() {
        let mut c = console();
        assert_eq!(c.process_line("write /notes/a.txt hello world").unwrap(), None);
        c.process_line("append /notes/a.txt !").unwrap();
        assert_eq!(
            c.process_line("cat /notes/a.txt").unwrap().as_deref(),
            Some("hello world!")
        );
        assert_eq!(
            c.process_line("stat /notes/a.txt").unwrap().as_deref(),
            Some("file, 12 bytes")
        );
        assert_eq!(c.process_line("stat /notes").unwrap().as_deref(), Some("directory"));
    }

    #[test]
    fn errors_carry_errno() {
        let mut c = console();
        let err = c.process_line("cat /missing").unwrap_err();
        assert!(describe(&err).starts_with("ENOENT: "));

        let err = c.process_line("cat").unwrap_err();
        assert!(describe(&err).starts_with("EINVAL: "));

        let err = c.process_line("frobnicate").unwrap_err();
        assert!(describe(&err).starts_with("ENOSYS: "));
    }

    #[test]
    fn rm_with_and_without_recursion() {
        let mut c = console();
        c.process_line("write /d/f x").unwrap();
        let err = c.process_line("rm /d").unwrap_err();
        assert!(describe(&err).starts_with("EBUSY"));
        c.process_line("rm -r /d").unwrap();
        assert!(c.process_line("stat /d").is_err());
    }

    #[test]
    fn exit_finishes() {
        let mut c = console();
        assert!(!c.finished());
        c.process_line("exit").unwrap();
        assert!(c.finished());
    }
}
