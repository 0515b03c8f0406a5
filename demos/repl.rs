use cadlisp::builtinops::builtin_names;
use cadlisp::host::{LogStyle, MemoryHost};
use cadlisp::marshal::entity_to_assoc_list;
use cadlisp::{InputRequest, Interpreter, InterpreterConfig, Step};
use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::{Value as JsonValue, json};
use std::panic;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Interactive console for CAD macro scripts, backed by an in-memory drawing
#[derive(Parser, Debug)]
#[command(name = "cadlisp", version)]
struct Args {
    /// Script file to run first
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Run a snippet then exit
    #[arg(short = 'c', long = "cmd", value_name = "CMD")]
    cmd: Option<String>,

    /// Drop into the REPL after running a script
    #[arg(short, long)]
    interactive: bool,

    /// Pause between `command` sub-steps, in milliseconds
    #[arg(long, default_value_t = 0)]
    pacing: u64,

    /// Echo the value of every batch
    #[arg(long)]
    echo: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = panic::catch_unwind(|| run(args));

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run(args: Args) {
    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let host = MemoryHost::new();
    let config = InterpreterConfig {
        command_pacing: Duration::from_millis(args.pacing),
        echo_result: args.echo,
        ..InterpreterConfig::default()
    };
    let mut interp = Interpreter::with_config(host.clone(), config);
    let mut console = Console { host, printed: 0 };

    let script = match (&args.cmd, &args.file) {
        (Some(cmd), _) => Some(cmd.clone()),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(err) => {
                eprintln!("Cannot read {}: {err}", path.display());
                process::exit(2);
            }
        },
        (None, None) => None,
    };

    if let Some(script) = script {
        let value = run_batch(&mut interp, &mut console, &mut rl, &script);
        if !args.interactive {
            if !args.echo {
                println!("{value}");
            }
            return;
        }
    }

    repl(&mut interp, &mut console, &mut rl);
}

fn repl(interp: &mut Interpreter, console: &mut Console, rl: &mut DefaultEditor) {
    println!("CAD macro console");
    println!("Enter expressions like: (entmake (list (list 0 \"CIRCLE\") (list 40 5)))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    loop {
        match rl.readline("lisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(interp);
                        continue;
                    }
                    ":entities" => {
                        print_entities(&console.host);
                        continue;
                    }
                    ":builtins" => {
                        print_builtins();
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let value = run_batch(interp, console, rl, line);
                if !interp.config().echo_result {
                    println!("{value}");
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Mirrors new host log lines to the terminal
struct Console {
    host: MemoryHost,
    printed: usize,
}

impl Console {
    fn flush(&mut self) {
        let drawing = self.host.drawing();
        let fresh = &drawing.log[self.printed..];
        for (text, style) in fresh {
            match style {
                LogStyle::Output | LogStyle::Prompt => print!("{text}"),
                LogStyle::Result => println!("=> {text}"),
                LogStyle::Error => println!("{text}"),
                LogStyle::Alert => println!("[alert] {text}"),
            }
        }
        if fresh.last().is_some_and(|(_, style)| *style == LogStyle::Output) {
            println!();
        }
        self.printed = drawing.log.len();
    }
}

/// Run a batch to completion, asking the terminal for every input request
fn run_batch(
    interp: &mut Interpreter,
    console: &mut Console,
    rl: &mut DefaultEditor,
    source: &str,
) -> cadlisp::Value {
    let mut execution = interp.execute(source);
    let mut step = execution.step();
    loop {
        console.flush();
        match step {
            Step::Finished(value) => return value,
            Step::AwaitingInput(request) => {
                step = match ask(rl, &request) {
                    Some(raw) => execution.resolve_input(raw),
                    None => execution.cancel_input(),
                };
            }
            Step::Stalled => {
                println!("Script stalled without an input request");
                return cadlisp::Value::Nil;
            }
        }
    }
}

/// Read one answer; an empty line or Ctrl+C cancels the request
fn ask(rl: &mut DefaultEditor, request: &InputRequest) -> Option<JsonValue> {
    let hint = match request.base_point {
        Some(base) => format!("  [{} from {},{}] ", request.kind, base.x, base.y),
        None => format!("  [{}] ", request.kind),
    };
    match rl.readline(&hint) {
        Ok(line) if !line.trim().is_empty() => Some(parse_answer(&line)),
        _ => None,
    }
}

/// JSON as typed, `x,y[,z]` as a point, anything else as text
fn parse_answer(line: &str) -> JsonValue {
    let line = line.trim();
    if let Ok(raw) = serde_json::from_str::<JsonValue>(line) {
        return raw;
    }
    let numbers: Option<Vec<f64>> = line
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect();
    match numbers {
        Some(coords) if coords.len() > 1 => json!(coords),
        _ => JsonValue::String(line.to_owned()),
    }
}

fn print_help() {
    println!("CAD macro console commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global variables");
    println!("  :entities  - Show the drawing as association lists");
    println!("  :builtins  - List builtin functions");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Answering input requests:");
    println!("  points:    5,7  or  [5,7]  or  {{\"x\":5,\"y\":7}}");
    println!("  numbers:   2.5");
    println!("  entsel:    {{\"entity\":1,\"point\":[0,0]}}");
    println!("  ssget:     [1,2,3]");
    println!("  empty line cancels the request (the script receives nil)");
    println!();
    println!("Examples:");
    println!("  (defun sq (x) (* x x))");
    println!("  (setq c (getpoint \"Center: \"))");
    println!("  (entmake (list (list 0 \"CIRCLE\") (list 10 (car c)) (list 20 (cadr c)) (list 40 (sq 2))))");
    println!();
}

fn print_environment(interp: &Interpreter) {
    let bindings = interp.globals().get_all_bindings();

    if bindings.is_empty() {
        println!("No global variables.");
        return;
    }

    println!("Global variables ({} total):", bindings.len());
    for (name, value) in bindings {
        println!("  {name} = {value}");
    }
}

fn print_entities(host: &MemoryHost) {
    let drawing = host.drawing();
    if drawing.entities.is_empty() {
        println!("The drawing is empty.");
        return;
    }
    for entity in &drawing.entities {
        println!("{}", entity_to_assoc_list(entity));
    }
}

fn print_builtins() {
    let mut col = 0;
    for name in builtin_names() {
        print!("  {name:<20}");
        col += 1;
        if col % 4 == 0 {
            println!();
        }
    }
    if col % 4 != 0 {
        println!();
    }
}
