use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use blackbox_core::apps::find_app;
use blackbox_core::apps::APP_CATALOG;
use blackbox_core::bridge::ScriptHost;
use blackbox_core::persistence::SnapshotStore;
use blackbox_core::session::CloseOutcome;
use blackbox_core::session::Session;
use blackbox_core::settings::SettingsDraft;
use blackbox_core::state::SessionState;
use blackbox_core::state::ViewMode;
use blackbox_core::Config;
use blackbox_exec::backend_from_config;
use blackbox_exec::StreamingGenerator;

mod commands;
mod render;

use commands::Command;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

struct Args {
    config: Option<PathBuf>,
    resume: bool,
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = parse_args(env::args().skip(1).collect())? else {
        return Ok(());
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::load(args.config.as_deref())?;
    let backend = backend_from_config(&config.model)?;
    let generator = StreamingGenerator::new(Arc::clone(&backend), config.prompt.system_prompt()?)
        .with_api_key_env(config.model.api_key_env.as_str());
    let state = SessionState::new(config.session.settings(), config.session.terminal());

    let mut repl = Repl {
        session: Session::new(generator, state),
        store: config.storage.snapshot_store(),
        draft: None,
        scripts: LoggedScripts,
    };
    println!(
        "blackbox {} ({} backend). Type `help` for commands.",
        env!("CARGO_PKG_VERSION"),
        backend.name()
    );
    if repl.store.exists() && (args.resume || confirm("Resume the saved session?")?) {
        repl.load()?;
    }
    repl.show();
    repl.run()
}

fn parse_args(args: Vec<String>) -> Result<Option<Args>, Box<dyn std::error::Error>> {
    let mut parsed = Args {
        config: None,
        resume: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-V" | "version" => {
                println!("blackbox {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--config" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--config requires a path".into());
                };
                parsed.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--resume" => {
                parsed.resume = true;
                i += 1;
            }
            other => {
                print_help();
                return Err(format!("unsupported argument: {other}").into());
            }
        }
    }
    Ok(Some(parsed))
}

/// Generated scripts cannot run in a terminal; they are only logged.
struct LoggedScripts;

impl ScriptHost for LoggedScripts {
    fn run_script(&mut self, script: &str) {
        log::info!("skipping generated script ({} bytes)", script.len());
    }
}

struct Repl {
    session: Session<StreamingGenerator>,
    store: SnapshotStore,
    draft: Option<SettingsDraft>,
    scripts: LoggedScripts,
}

impl Repl {
    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut line = String::new();
        loop {
            print!("{}> ", self.session.window_title());
            io::stdout().flush()?;
            line.clear();
            if io::stdin().read_line(&mut line)? == 0 {
                println!();
                return Ok(());
            }
            match commands::parse(&line) {
                Ok(Some(Command::Quit)) => return Ok(()),
                Ok(Some(command)) => self.execute(command)?,
                Ok(None) => {}
                Err(message) => println!("{message}"),
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Command::Help => println!("{}", commands::HELP),
            Command::Apps => {
                for app in APP_CATALOG.iter() {
                    println!("  {} {:<20} {}", app.icon, app.id, app.name);
                }
            }
            Command::Open(app_id) => {
                if find_app(&app_id).is_none() {
                    println!("no such app: {app_id}");
                } else {
                    self.session.open_app(&app_id);
                    self.settle();
                }
            }
            Command::Click(number) => match self.session.click_targets().get(number - 1) {
                Some(target) => {
                    let target = target.clone();
                    self.session.click(&target);
                    self.settle();
                }
                None => println!("no target {number}; `show` lists them"),
            },
            Command::Set { id, value } => {
                if !self.session.set_input(&id, &value) {
                    println!("no input `{id}` on this screen");
                }
            }
            Command::Up => self.print_history(true),
            Command::Down => self.print_history(false),
            Command::Upload(path) => self.upload(path)?,
            Command::Close => {
                if self.session.request_close() == CloseOutcome::NeedsConfirmation {
                    if !confirm("Discard unsaved changes?")? {
                        return Ok(());
                    }
                    self.session.confirm_close();
                }
                self.settle();
            }
            Command::Show => self.show(),
            Command::Params => {
                self.session.toggle_parameters();
                self.draft = (self.session.state().mode() == ViewMode::Parameters)
                    .then(|| SettingsDraft::from_state(self.session.state()));
                self.settle();
            }
            Command::Param { field, value } => match self.draft.as_mut() {
                Some(draft) => {
                    if draft.set(&field, &value) {
                        self.show();
                    } else {
                        println!("cannot set {field} to `{value}`");
                    }
                }
                None => println!("open the panel with `params` first"),
            },
            Command::Apply => match &self.draft {
                Some(draft) => match self.session.commit_settings(draft) {
                    Ok(()) => println!("parameters applied"),
                    Err(err) => println!("{err}"),
                },
                None => println!("open the panel with `params` first"),
            },
            Command::ClearHistory => {
                self.session.clear_history();
                println!("interaction history cleared");
            }
            Command::Save => {
                self.store.save(&self.session.snapshot())?;
                println!("saved to {}", self.store.path().display());
            }
            Command::Load => {
                self.load()?;
                self.show();
            }
            Command::ClearSaved => {
                self.store.clear()?;
                println!("saved session removed");
            }
            Command::Quit => {}
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.store.load()? {
            Some(snapshot) => match self.session.restore(snapshot) {
                Ok(()) => {
                    self.draft = None;
                    self.settle_quietly();
                }
                Err(err) => println!("saved session not loaded: {err}"),
            },
            None => println!("no saved session at {}", self.store.path().display()),
        }
        Ok(())
    }

    fn upload(&mut self, path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if !self.session.bridge().has_upload_input() {
            println!("this screen has no upload control");
            return Ok(());
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            println!("not a file: {}", path.display());
            return Ok(());
        };
        let contents = fs::read_to_string(&path)?;
        self.session.upload_file(name, contents);
        self.settle();
        Ok(())
    }

    fn print_history(&mut self, older: bool) {
        let entry = if older {
            self.session.history_previous()
        } else {
            self.session.history_next()
        };
        match entry {
            Some(command) => println!("terminal_input = {command}"),
            None => println!("no terminal on this screen"),
        }
    }

    /// Streams the pending turn to completion, then prints the screen.
    fn settle(&mut self) {
        self.settle_quietly();
        self.show();
    }

    fn settle_quietly(&mut self) {
        let mut dots = 0;
        while self.session.pump() {
            dots += 1;
            if dots % 8 == 0 {
                eprint!(".");
            }
        }
        if dots >= 8 {
            eprintln!();
        }
        self.session.run_scripts(&mut self.scripts);
    }

    fn show(&self) {
        let state = self.session.state();
        println!("== {} ==", self.session.window_title());
        match state.mode() {
            ViewMode::Desktop => println!("Open an app with `open APP_ID` (`apps` lists them)."),
            ViewMode::Parameters => {
                if let Some(draft) = &self.draft {
                    println!("  history       {}", draft.max_history_length);
                    println!("  statefulness  {}", on_off(draft.statefulness));
                    println!("  quiet         {}", on_off(draft.quiet_mode));
                    println!("  color         {}", draft.color_scheme);
                    println!("  font          {}", draft.font_size);
                }
            }
            ViewMode::App => {
                let text = render::html_to_text(&state.content);
                if !text.is_empty() {
                    println!("{text}");
                }
                let targets = self.session.click_targets();
                if !targets.is_empty() {
                    println!("-- targets --\n{}", render::describe_targets(&targets));
                }
                let bridge = self.session.bridge();
                if let Some(view) = bridge.view() {
                    for id in render::input_ids(view.document()) {
                        let value = bridge.input_value(&id).unwrap_or_default();
                        println!("  <{id}> = {value}");
                    }
                }
            }
        }
        if let Some(error) = &state.error {
            println!("error: {error}");
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn confirm(question: &str) -> io::Result<bool> {
    print!("{question} [y/N]: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "YES"))
}

fn print_help() {
    println!("blackbox {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  blackbox [--config PATH] [--resume]");
    println!("  blackbox --help");
    println!("  blackbox --version");
    println!();
    println!("Set RUST_LOG=info for backend and stream logs.");
}
