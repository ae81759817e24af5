use std::io::{IsTerminal, Read};
use std::process::ExitCode;

use moonlet::{Config, Error, LuaValue, State, VERSION};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: moonlet [options] [script [args]]
Available options are:
  -e stat   execute string 'stat'
  -i        enter interactive mode after executing 'script'
  -l mod    require library 'mod' into global 'mod'
  -v        show version information
  --        stop handling options
  -         execute stdin and stop handling options";

/// `-e` and `-l` run in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Exec(String),
    Require(String),
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    actions: Vec<Action>,
    interactive: bool,
    show_version: bool,
    /// `Some("-")` reads the script from stdin.
    script: Option<String>,
    script_args: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--" => {
                if let Some(script) = args.get(i + 1) {
                    opts.script = Some(script.clone());
                    opts.script_args = args[i + 2..].to_vec();
                }
                return Ok(opts);
            }
            "-" => {
                opts.script = Some("-".to_string());
                opts.script_args = args[i + 1..].to_vec();
                return Ok(opts);
            }
            "-i" => opts.interactive = true,
            "-v" => opts.show_version = true,
            "-e" | "-l" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("'{arg}' needs argument"))?
                    .clone();
                opts.actions.push(if arg == "-e" {
                    Action::Exec(value)
                } else {
                    Action::Require(value)
                });
                i += 1;
            }
            _ if arg.starts_with("-e") => opts.actions.push(Action::Exec(arg[2..].to_string())),
            _ if arg.starts_with("-l") => opts.actions.push(Action::Require(arg[2..].to_string())),
            _ if arg.starts_with('-') => return Err(format!("unrecognized option '{arg}'")),
            _ => {
                opts.script = Some(arg.to_string());
                opts.script_args = args[i + 1..].to_vec();
                return Ok(opts);
            }
        }
        i += 1;
    }
    Ok(opts)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MOONLET_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(err: &Error) {
    eprintln!("moonlet: {err}");
}

fn print_version() {
    println!("Moonlet {VERSION} -- Lua 5.4 compatible");
}

/// Global `arg`: script at 0, its arguments from 1, the interpreter at -1.
fn set_arg_table(state: &mut State, opts: &Options) {
    let table = state.create_table();
    let LuaValue::Table(t) = table else { return };
    let mut entries = vec![(-1, "moonlet".to_string())];
    if let Some(script) = &opts.script {
        entries.push((0, script.clone()));
    }
    for (i, a) in opts.script_args.iter().enumerate() {
        entries.push((i as i64 + 1, a.clone()));
    }
    for (i, s) in entries {
        let v = state.create_string(&s);
        state.vm_mut().heap.table_mut(t).set_int(i, v);
    }
    state.set_global("arg", table);
}

fn require_into_global(state: &mut State, name: &str) -> Result<(), Error> {
    let require = state.get_global("require");
    let arg = state.create_string(name);
    let results = state.run_blocking(require, &[arg])?;
    state.set_global(name, results.first().copied().unwrap_or(LuaValue::Nil));
    Ok(())
}

fn run_script(state: &mut State, opts: &Options, script: &str) -> Result<(), Error> {
    let f = if script == "-" {
        let mut source = Vec::new();
        std::io::stdin().read_to_end(&mut source).map_err(|source| Error::Io {
            path: "stdin".to_string(),
            source,
        })?;
        state.compile(moonlet::state::strip_shebang(&source), "=stdin")?
    } else {
        state.compile_file(script)?
    };
    let args: Vec<LuaValue> = opts.script_args.iter().map(|a| state.create_string(a)).collect();
    state.run_blocking(f, &args)?;
    Ok(())
}

/// Compile a REPL entry, as an expression first.
fn compile_entry(state: &mut State, source: &str) -> Result<LuaValue, Error> {
    state
        .compile(format!("return {source}"), "=stdin")
        .or_else(|_| state.compile(source, "=stdin"))
}

fn repl(state: &mut State) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("moonlet: cannot initialize REPL: {e}");
            return;
        }
    };
    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "> " } else { ">> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                buffer.push_str(&line);
                buffer.push('\n');
                let f = match compile_entry(state, &buffer) {
                    // Incomplete statement: keep reading.
                    Err(Error::Compile(e)) if e.message().contains("<eof>") => continue,
                    Err(e) => {
                        report(&e);
                        buffer.clear();
                        continue;
                    }
                    Ok(f) => f,
                };
                buffer.clear();
                match state.run_blocking(f, &[]) {
                    Ok(values) if !values.is_empty() => {
                        let print = state.get_global("print");
                        if let Err(e) = state.run_blocking(print, &values) {
                            report(&e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => report(&e),
                }
            }
            Err(ReadlineError::Interrupted) => buffer.clear(),
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("moonlet: readline error: {e}");
                break;
            }
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("moonlet: {msg}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let mut state = State::with_config(Config::from_env());
    state.open_libs();
    set_arg_table(&mut state, &opts);

    if opts.show_version {
        print_version();
    }

    for action in &opts.actions {
        let result = match action {
            Action::Exec(stat) => state.do_string_blocking(stat, "=(command line)").map(drop),
            Action::Require(name) => require_into_global(&mut state, name),
        };
        if let Err(e) = result {
            report(&e);
            return ExitCode::FAILURE;
        }
    }

    let stdin_is_tty = std::io::stdin().is_terminal();
    let script = match &opts.script {
        Some(script) => Some(script.clone()),
        None if opts.actions.is_empty() && !opts.show_version && !opts.interactive && !stdin_is_tty => {
            Some("-".to_string())
        }
        None => None,
    };
    if let Some(script) = script {
        if let Err(e) = run_script(&mut state, &opts, &script) {
            report(&e);
            return ExitCode::FAILURE;
        }
    }

    let idle = opts.script.is_none() && opts.actions.is_empty() && !opts.show_version;
    if opts.interactive || (idle && stdin_is_tty) {
        if !opts.show_version {
            print_version();
        }
        repl(&mut state);
    }
    ExitCode::SUCCESS
}
