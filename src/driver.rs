//! Parsing of a module and everything it imports.
//!
//! Every module is parsed on its own thread. A coordinator collects the parsed
//! modules over a channel and schedules the modules they import, until no
//! parse is left pending.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread,
};

use crate::{
    config::Config,
    diagnostics::Diagnostics,
    module::{self, ModuleName, ParsedModule, SourceUnit},
    token::SourceLocation,
    type_checker::Checker,
    types::TypeRegistry,
};

#[derive(Debug, Default)]
pub struct Compilation {
    /// The parsed modules, sorted by name.
    pub modules: Vec<ParsedModule>,
    pub diagnostics: Diagnostics,
}

impl Compilation {
    pub fn module(&self, name: &ModuleName) -> Option<&ParsedModule> {
        self.modules.iter().find(|module| &module.name == name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// Type checks every module.
    pub fn check(&mut self) -> TypeRegistry {
        let checker = Checker::with_capacity(self.modules.len() * 8);
        let (registry, diagnostics) = checker.check(&mut self.modules);
        self.diagnostics.append(diagnostics);
        registry
    }
}

/// Parses the root modules and everything they import.
///
/// Once an error is found, no new modules are scheduled, but modules already
/// being parsed are waited for.
pub fn parse_modules(config: &Config, roots: Vec<(ModuleName, PathBuf)>) -> Compilation {
    let mut compilation = Compilation::default();
    let mut seen = HashSet::new();

    let roots = roots
        .into_iter()
        .filter(|(name, _)| seen.insert(name.clone()))
        .collect::<Vec<_>>();

    run_tasks(
        roots,
        |(name, path)| {
            log::debug!("parsing {name} ({})", path.display());
            parse_file(name, &path)
        },
        |(module, diagnostics), scheduled| {
            log::debug!("parsed {}", module.name);
            compilation.diagnostics.append(diagnostics);

            for (dependency, location) in module.dependencies() {
                if compilation.diagnostics.has_errors() {
                    break;
                }
                if !seen.insert(dependency.clone()) {
                    continue;
                }
                match config.resolve(&dependency) {
                    Some(path) => scheduled.push((dependency, path)),
                    None => compilation.diagnostics.module_not_found(&dependency, location),
                }
            }

            compilation.modules.push(module);
        },
    );

    compilation.modules.sort_by(|a, b| a.name.cmp(&b.name));
    compilation
}

/// A finished task, with a sender to schedule more tasks on.
struct Finished<R> {
    result: R,
    sender: mpsc::Sender<Finished<R>>,
}

/// Runs `work` on every root on its own thread, handing each result to
/// `handle` on the calling thread. Tasks that `handle` pushes are run too.
///
/// Each task sends its sender back along with its result, so the only live
/// senders belong to running tasks and to the result being handled. Once all
/// of them are gone, even through a panic, the channel disconnects and the
/// loop ends. The panic itself resurfaces when the scope is left.
fn run_tasks<T, R>(
    roots: Vec<T>,
    work: impl Fn(T) -> R + Sync,
    mut handle: impl FnMut(R, &mut Vec<T>),
) where
    T: Send,
    R: Send,
{
    let (sender, receiver) = mpsc::channel::<Finished<R>>();
    let work = &work;

    thread::scope(|scope| {
        let spawn = |task: T, sender: mpsc::Sender<Finished<R>>| {
            scope.spawn(move || {
                let result = work(task);
                // The receiver lives until every sender is dropped.
                let _ = sender.send(Finished {
                    result,
                    sender: sender.clone(),
                });
            });
        };

        for task in roots {
            spawn(task, sender.clone());
        }
        drop(sender);

        let mut scheduled = Vec::new();
        while let Ok(Finished { result, sender }) = receiver.recv() {
            handle(result, &mut scheduled);
            for task in scheduled.drain(..) {
                spawn(task, sender.clone());
            }
        }
    });
}

fn parse_file(name: ModuleName, path: &Path) -> (ParsedModule, Diagnostics) {
    match SourceUnit::read(path) {
        Ok(source) => module::parse_module(name, &source),
        Err(error) => {
            let path: Arc<Path> = Arc::from(path);
            let mut diagnostics = Diagnostics::new();
            diagnostics.unreadable_source(&path, error, SourceLocation::start_of(path.clone()));
            (ParsedModule::empty(name, path), diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use pretty_assertions::assert_eq;

    struct Project {
        dir: tempfile::TempDir,
    }

    impl Project {
        fn new() -> Project {
            let project = Project {
                dir: tempfile::tempdir().unwrap(),
            };
            project.write("std::bootstrap", "");
            project.write("std::prelude", "");
            project
        }

        fn write(&self, module: &str, source: &str) {
            let path = self.path(module);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }

        fn path(&self, module: &str) -> PathBuf {
            self.dir
                .path()
                .join(ModuleName::parse(module).source_path("aeon"))
        }

        fn parse(&self, root: &str) -> Compilation {
            let mut config = Config::new();
            config.add_directory(self.dir.path());
            parse_modules(&config, vec![(ModuleName::parse(root), self.path(root))])
        }
    }

    fn names(compilation: &Compilation) -> Vec<String> {
        compilation
            .modules
            .iter()
            .map(|module| module.name.to_string())
            .collect()
    }

    fn messages(compilation: &Compilation) -> Vec<String> {
        compilation
            .diagnostics
            .iter()
            .map(|d| format!("{}: {}", d.location, d.message))
            .collect()
    }

    #[test]
    fn tasks_schedule_more_tasks() {
        let mut results = Vec::new();
        run_tasks(
            vec![3_u32],
            |n| n,
            |n, scheduled| {
                results.push(n);
                if n > 0 {
                    scheduled.push(n - 1);
                }
            },
        );
        results.sort_unstable();
        assert_eq!(results, [0, 1, 2, 3]);
    }

    #[test]
    fn panicking_tasks_do_not_hang_the_coordinator() {
        let mut results = Vec::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_tasks(
                vec![1_u32, 2, 3],
                |n| {
                    assert_ne!(n, 2, "task failed");
                    n
                },
                |n, _| results.push(n),
            );
        }));
        assert!(outcome.is_err());
        results.sort_unstable();
        assert_eq!(results, [1, 3]);
    }

    #[test]
    fn diamond_imports_are_parsed_once() {
        let project = Project::new();
        project.write("main", "import a\nimport b");
        project.write("a", "import c");
        project.write("b", "import c");
        project.write("c", "1");

        let compilation = project.parse("main");
        assert_eq!(messages(&compilation), Vec::<String>::new());
        assert_eq!(
            names(&compilation),
            ["a", "b", "c", "main", "std::bootstrap", "std::prelude"]
        );
    }

    #[test]
    fn missing_modules_are_reported_at_the_import() {
        let project = Project::new();
        project.write("main", "\nimport nope");

        let compilation = project.parse("main");
        assert!(compilation.has_errors());
        assert_eq!(
            messages(&compilation),
            ["2:1: the module `nope` could not be found"]
        );
    }

    #[test]
    fn no_modules_are_scheduled_after_an_error() {
        let project = Project::new();
        project.write("main", "import nope\nimport a");
        project.write("a", "import b");
        project.write("b", "");

        let compilation = project.parse("main");
        assert!(compilation.has_errors());
        // The std modules were scheduled before the error and still complete.
        assert_eq!(
            names(&compilation),
            ["main", "std::bootstrap", "std::prelude"]
        );
    }

    #[test]
    fn syntax_errors_keep_the_module() {
        let project = Project::new();
        project.write("main", "import a");
        project.write("a", "let mut A = 1");

        let compilation = project.parse("main");
        assert_eq!(messages(&compilation), ["1:9: constants can't be mutable"]);
        let module = compilation.module(&ModuleName::parse("a")).unwrap();
        assert!(module.ast.children.is_empty());
    }

    #[test]
    fn unreadable_roots_are_reported() {
        let project = Project::new();
        let compilation = project.parse("missing");
        assert!(compilation.has_errors());
        let message = &compilation.diagnostics.iter().next().unwrap().message;
        assert!(message.starts_with("the file `"), "{message}");
        assert_eq!(names(&compilation), ["missing"]);
    }
}
