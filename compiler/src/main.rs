use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;

use kfc::codegen::CodegenOptions;
use kfc::emit::EmitOptions;
use kfc::pipeline::{CompilationState, Phase, PipelineOptions, Request};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// C++ kernel body
    Cpp,
    /// Fragment listing
    Ir,
    /// Canonical signature and cache key
    Sig,
    /// Graphviz DAG
    Dot,
    /// JSON manifest
    Json,
    /// Evaluate on `--input` values
    Eval,
}

impl EmitStage {
    fn terminal(self) -> Phase {
        match self {
            EmitStage::Sig | EmitStage::Dot => Phase::Differentiate,
            EmitStage::Ir | EmitStage::Json | EmitStage::Eval => Phase::Emit,
            EmitStage::Cpp => Phase::Render,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "kfc",
    version,
    about = "Kernel Formula Compiler: compiles symbolic reduction formulas and their gradients to C++ kernel bodies"
)]
struct Cli {
    /// Formula, e.g. `Exp(-SqDist(x, y)) * b`
    formula: Option<String>,

    /// Read aliases (lines containing `=`) and the formula from a file
    #[arg(short, long, conflicts_with = "formula")]
    file: Option<PathBuf>,

    /// Alias declaration such as `x=Vi(0,3)` (repeatable)
    #[arg(short, long = "alias")]
    alias: Vec<String>,

    /// Differentiate with respect to this variable
    #[arg(long)]
    grad: Option<String>,

    /// Incoming adjoint (defaults to a fresh `Vi` variable)
    #[arg(long, requires = "grad")]
    gradin: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Cpp)]
    emit: EmitStage,

    /// Input values for `--emit eval`: `NAME=v1,v2,...` (repeatable)
    #[arg(long = "input")]
    input: Vec<String>,

    /// Scalar type of emitted temporaries
    #[arg(long, default_value = "float")]
    dtype: String,

    /// Loops with at most this many iterations are expanded
    #[arg(long, default_value_t = 4)]
    unroll_limit: usize,

    /// Output file path (stdout when absent)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,

    /// List the functions of the formula notation and exit
    #[arg(long)]
    list_functions: bool,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    if cli.list_functions {
        for name in kfc::resolve::function_names() {
            println!("{}", name);
        }
        return;
    }

    let request = match build_request(&cli) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("kfc: error: {}", msg);
            std::process::exit(2);
        }
    };

    if cli.verbose {
        eprintln!("kfc: formula = {}", request.formula.trim());
        eprintln!("kfc: aliases = {}", request.aliases.len());
        eprintln!("kfc: emit    = {:?}", cli.emit);
    }

    let options = PipelineOptions {
        emit: EmitOptions {
            unroll_limit: cli.unroll_limit,
        },
        codegen: CodegenOptions {
            dtype: cli.dtype.clone(),
        },
        verbose: cli.verbose,
    };

    let mut state = CompilationState::new(request);
    let result = kfc::pipeline::run_pipeline(&mut state, cli.emit.terminal(), &options, |_, _| {});
    for (origin, diag) in &state.diagnostics {
        eprintln!("kfc: {}", state.render_diagnostic(*origin, diag));
    }
    if let Err(err) = result {
        if cli.verbose {
            eprintln!("kfc: stopped after {}", err.failing_phase.name());
        }
        std::process::exit(1);
    }

    let text = match render(&cli, &state) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("kfc: error: {}", msg);
            std::process::exit(1);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &text) {
                eprintln!("kfc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            if cli.verbose {
                eprintln!("kfc: wrote {}", path.display());
            }
        }
        None => print!("{}", text),
    }
}

fn build_request(cli: &Cli) -> Result<Request, String> {
    let mut aliases = Vec::new();
    let formula = match (&cli.file, &cli.formula) {
        (Some(path), _) => {
            let source = std::fs::read_to_string(path)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            let mut formula_lines = Vec::new();
            for line in source.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if line.contains('=') {
                    aliases.push(line.to_string());
                } else {
                    formula_lines.push(line);
                }
            }
            formula_lines.join(" ")
        }
        (None, Some(formula)) => formula.clone(),
        (None, None) => return Err("no formula given (pass one or use --file)".to_string()),
    };
    aliases.extend(cli.alias.iter().cloned());
    Ok(Request {
        formula,
        aliases,
        grad: cli.grad.clone(),
        gradin: cli.gradin.clone(),
    })
}

fn render(cli: &Cli, state: &CompilationState) -> Result<String, String> {
    let missing = || "nothing to emit".to_string();
    match cli.emit {
        EmitStage::Cpp => state.cpp.clone().ok_or_else(missing),
        EmitStage::Ir => state
            .kernel
            .as_ref()
            .map(kfc::codegen::render_ir)
            .ok_or_else(missing),
        EmitStage::Sig => state
            .target
            .as_ref()
            .map(|f| format!("{}\n{}\n", f.signature(), f.cache_key()))
            .ok_or_else(missing),
        EmitStage::Dot => state
            .target
            .as_ref()
            .map(kfc::dot::emit_dot)
            .ok_or_else(missing),
        EmitStage::Json => state
            .manifest()
            .ok_or_else(missing)?
            .to_json()
            .map_err(|e| e.to_string()),
        EmitStage::Eval => {
            let body = state.kernel.as_ref().ok_or_else(missing)?;
            let inputs = parse_inputs(&cli.input, state)?;
            let values = kfc::interp::run(body, &inputs).map_err(|e| e.to_string())?;
            let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            Ok(format!("{}\n", values.join(" ")))
        }
    }
}

/// `NAME=v1,v2,...` where NAME is an alias or an input slot such as `arg_i0`.
fn parse_inputs(entries: &[String], state: &CompilationState) -> Result<HashMap<String, Vec<f64>>, String> {
    let mut inputs = HashMap::new();
    for entry in entries {
        let (name, values) = entry
            .split_once('=')
            .ok_or_else(|| format!("malformed input `{}` (expected NAME=v1,v2,...)", entry))?;
        let name = name.trim();
        let slot = match state.bindings.get(name) {
            Some(binding) => binding.var.slot_name(),
            None => name.to_string(),
        };
        let values = values
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| format!("input `{}`: `{}`: {}", name, v.trim(), e))
            })
            .collect::<Result<Vec<f64>, String>>()?;
        inputs.insert(slot, values);
    }
    Ok(inputs)
}
