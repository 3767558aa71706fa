//! Slate CLI - compile a resolved program to a target language
//!
//! The resolver runs as a separate tool and hands over the resolved IR as a
//! JSON file; `slatec` lowers it for one target:
//!
//! ```text
//! slatec program.rir.json --target java --out build/ --compile-level run
//! ```

use std::env;
use std::fs;
use std::process::ExitCode;

use slate::codegen::backends::backend_for;
use slate::codegen::driver::compile_program;
use slate::diagnostics::{render_all, Colors};
use slate::{CompileLevel, Options, Program, TargetTag};

fn usage() -> ! {
    eprintln!("usage: slatec <program.rir.json> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --target <tag>          java | cs | go | js | py | cpp (default: java)");
    eprintln!("  --out <dir>             output directory (default: slate-out)");
    eprintln!("  --compile-level <lvl>   none | source | compile | run (default: source)");
    eprintln!("  --main <fq-name>        entry-point override (Module.Class.Method)");
    eprintln!("  --no-verify             record that verification was skipped");
    eprintln!("  --color                 force ANSI colors in diagnostics");
    std::process::exit(2);
}

fn parse_args(args: &[String]) -> (String, Options) {
    let mut input: Option<String> = None;
    let mut target = TargetTag::Java;
    let mut out_dir = String::from("slate-out");
    let mut level = CompileLevel::Source;
    let mut main_override: Option<String> = None;
    let mut verified = true;
    let mut use_color = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--target" => {
                i += 1;
                let tag = args.get(i).unwrap_or_else(|| usage());
                target = TargetTag::parse(tag).unwrap_or_else(|| {
                    eprintln!("unknown target: {}", tag);
                    usage()
                });
            }
            "--out" => {
                i += 1;
                out_dir = args.get(i).unwrap_or_else(|| usage()).clone();
            }
            "--compile-level" => {
                i += 1;
                level = match args.get(i).map(|s| s.as_str()) {
                    Some("none") => CompileLevel::None,
                    Some("source") => CompileLevel::Source,
                    Some("compile") => CompileLevel::Compile,
                    Some("run") => CompileLevel::Run,
                    _ => usage(),
                };
            }
            "--main" => {
                i += 1;
                main_override = Some(args.get(i).unwrap_or_else(|| usage()).clone());
            }
            "--no-verify" => verified = false,
            "--color" => use_color = true,
            arg if arg.starts_with("--") => {
                eprintln!("unknown option: {}", arg);
                usage()
            }
            arg => {
                if input.is_some() {
                    usage();
                }
                input = Some(arg.to_string());
            }
        }
        i += 1;
    }

    let input = input.unwrap_or_else(|| usage());
    let mut options = Options::new(target, out_dir).with_level(level);
    options.verified = verified;
    options.main_override = main_override;
    options.use_color = use_color;
    (input, options)
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let (input, options) = parse_args(&args);
    let colors = Colors::new(options.use_color);

    let source = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {}", input, e);
            return ExitCode::FAILURE;
        }
    };

    let program: Program = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error parsing resolved IR from {}: {}", input, e);
            return ExitCode::FAILURE;
        }
    };

    if !options.verified {
        eprintln!("note: verification was skipped for this compilation");
    }

    let backend = backend_for(options.target);
    match compile_program(&program, &options, backend.as_ref()) {
        Ok(artifacts) => {
            if artifacts.main.is_none() {
                eprintln!("note: no entry point found; emitted a library-only artifact set");
            }
            if options.level >= CompileLevel::Source {
                println!(
                    "wrote {} file(s) to {}",
                    artifacts.written.len(),
                    options.out_dir.display()
                );
            }
            if let Some(run) = artifacts.run {
                print!("{}", run.stdout);
                if run.status != 0 {
                    return ExitCode::from(run.status.clamp(0, 255) as u8);
                }
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            eprintln!("{}", render_all(&failure.errors, Some(&input), &colors));
            ExitCode::FAILURE
        }
    }
}
