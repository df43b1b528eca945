use std::{
    error::Error,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::Parser as _;

use aeon::{
    config::Config,
    driver,
    module::ModuleName,
    parser::Parser,
    scope::Scopes,
    util::fmt::tree,
};

/// Parses and type checks Aeon modules.
#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The root module. Without it, expressions are read from stdin.
    file: Option<PathBuf>,

    /// Extra directories to search for imported modules, before those of
    /// `AEON_DIRECTORIES`.
    #[arg(short = 'I', long = "directory", value_name = "PATH")]
    directories: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.file {
        Some(path) => compile(path, cli.directories),
        None => repl().map(|()| true),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("failed to run: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Parses and checks a file and its imports. Returns whether no errors were
/// found.
fn compile(path: PathBuf, directories: Vec<PathBuf>) -> Result<bool, Box<dyn Error>> {
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| format!("`{}` is not a valid module path", path.display()))?;
    let name = ModuleName::parse(name);

    let mut config = Config::new();
    config.directories = directories;
    config.populate_from_env();
    if let Some(directory) = path.parent() {
        config.add_directory(directory);
    }

    let mut compilation = driver::parse_modules(&config, vec![(name, path)]);
    if !compilation.has_errors() {
        compilation.check();
    }

    for diagnostic in compilation.diagnostics.iter() {
        eprintln!("{diagnostic}");
    }
    Ok(!compilation.has_errors())
}

fn repl() -> Result<(), Box<dyn Error>> {
    let file: Arc<Path> = Arc::from(Path::new("<stdin>"));
    let mut input = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        input.clear();
        let n = io::stdin().read_line(&mut input)?;

        if n == 0 {
            println!("^D");
            return Ok(());
        }
        if input.trim().is_empty() {
            continue;
        }

        let mut scopes = Scopes::new();
        match Parser::new(input.as_bytes(), file.clone(), &mut scopes).parse_standalone_expression() {
            Ok((node, _)) => print!("{}", tree::print_node_string(&node)),
            Err(error) => println!("{}: error: {error}", error.location),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    #[test]
    fn arguments() {
        let cli = Cli::try_parse_from(["aeonc", "-I", "std", "--directory", "lib", "main.aeon"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("main.aeon")));
        assert_eq!(cli.directories, [PathBuf::from("std"), PathBuf::from("lib")]);

        let cli = Cli::try_parse_from(["aeonc"]).unwrap();
        assert!(cli.file.is_none() && cli.directories.is_empty());
    }
}
