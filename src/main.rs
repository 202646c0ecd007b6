use std::env;
use std::fs;
use std::process;

fn usage() {
    eprintln!("usage: scoreprep [--check] <input> [output.yaml]");
    eprintln!();
    eprintln!("  resolves a settings/score document and dumps the resolved");
    eprintln!("  values as YAML to stdout or to the given output file");
    eprintln!();
    eprintln!("  --check   validate only, print nothing on success");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut input: Option<&str> = None;
    let mut output: Option<&str> = None;
    let mut check = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "--check" => check = true,
            "--help" | "-h" => {
                usage();
                return;
            }
            other if input.is_none() => input = Some(other),
            other if output.is_none() => output = Some(other),
            _ => {
                usage();
                process::exit(2);
            }
        }
    }
    let input = match input {
        Some(path) => path,
        None => {
            usage();
            process::exit(2);
        }
    };

    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read `{}': {}", input, err);
            process::exit(1);
        }
    };

    let mut session = scoreprep::Session::new();
    let report = match session.parse_document(input, &source) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(1);
        }
    };
    for diagnostic in session.formatted_diagnostics() {
        eprintln!("error: {}", diagnostic);
    }
    if report.errors > 0 {
        process::exit(1);
    }
    if check {
        return;
    }

    let yaml = match serde_yaml::to_string(&session.output()) {
        Ok(yaml) => yaml,
        Err(err) => {
            eprintln!("error: cannot serialize output: {}", err);
            process::exit(1);
        }
    };
    match output {
        Some(path) => {
            if let Err(err) = fs::write(path, yaml) {
                eprintln!("error: cannot write `{}': {}", path, err);
                process::exit(1);
            }
        }
        None => print!("{}", yaml),
    }
}
