use std::collections::HashMap;
use std::io;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::{bail, Context, Error};

use rom_runtime::{CallType, Callable, ModuleId, Runtime, Value, Visibility};

/// What a command asks of the loop once it ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Print this line.
    Print(String),
    /// Nothing to print.
    Silent,
    /// Stop reading commands.
    Exit,
}

/// The command interpreter, with its named variables.
pub struct Shell<'a> {
    runtime: &'a Runtime,
    variables: HashMap<String, Value>,
}

impl<'a> Shell<'a> {
    /// A shell with no variables bound yet.
    pub fn new(runtime: &'a Runtime) -> Self {
        Self {
            runtime,
            variables: HashMap::new(),
        }
    }

    /// Run one command line.
    pub fn execute(&mut self, line: &str) -> Result<Outcome, Error> {
        let line = line.split('#').next().unwrap_or_default().trim();
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Ok(Outcome::Silent);
        };
        let runtime = self.runtime;

        let output = match (command, args) {
            ("exit", []) => return Ok(Outcome::Exit),
            ("class", [path]) => {
                let (outer, name) = self.split_path(path)?;
                let id = runtime.define_class_under(outer, name, None)?;
                runtime.module_name(id)
            }
            ("class", [path, "<", superclass]) => {
                let superclass = self.module(superclass)?;
                let (outer, name) = self.split_path(path)?;
                let id = runtime.define_class_under(outer, name, Some(superclass))?;
                runtime.module_name(id)
            }
            ("module", [path]) => {
                let (outer, name) = self.split_path(path)?;
                let id = runtime.define_module_under(outer, name)?;
                runtime.module_name(id)
            }
            ("include", [target, module]) => {
                runtime.include_module(self.module(target)?, self.module(module)?)?;
                self.render_ancestors(self.module(target)?)
            }
            ("def", [target, name]) => {
                runtime.define_method(self.module(target)?, name, Callable::Constant(Value::Nil))?;
                format!(":{name}")
            }
            ("def", [target, name, value]) => {
                let value = self.value(value)?;
                runtime.define_method(self.module(target)?, name, Callable::Constant(value))?;
                format!(":{name}")
            }
            ("private", [target, name]) => {
                runtime.set_visibility(self.module(target)?, &[*name], Visibility::Private)?;
                format!(":{name}")
            }
            ("undef", [target, name]) => {
                runtime.undef_method(self.module(target)?, name)?;
                format!(":{name}")
            }
            ("remove", [target, name]) => {
                runtime.remove_method(self.module(target)?, name)?;
                format!(":{name}")
            }
            ("alias", [target, new_name, old_name]) => {
                runtime.alias_method(self.module(target)?, new_name, old_name)?;
                format!(":{new_name}")
            }
            ("new", [var, class]) => {
                let obj = runtime.new_instance(self.module(class)?, Vec::new())?;
                self.bind(var, Value::Object(obj))
            }
            ("set", [var, ivar, value]) => {
                let value = self.value(value)?;
                let obj = self.object(var)?;
                runtime.instance_variable_set(&obj, ivar, value.clone())?;
                runtime.inspect(&value)
            }
            ("get", [var, ivar]) => {
                let obj = self.object(var)?;
                let value = runtime.instance_variable_get(&obj, ivar)?;
                runtime.inspect(&value.unwrap_or(Value::Nil))
            }
            ("call", [receiver, name, rest @ ..]) => {
                let receiver = self.value(receiver)?;
                let args = rest
                    .iter()
                    .map(|it| self.value(it))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = runtime.call_method(&receiver, name, args, CallType::Normal, None)?;
                runtime.inspect(&value)
            }
            ("sdef", [var, name, value]) => {
                let value = self.value(value)?;
                let receiver = self.value(var)?;
                runtime.define_singleton_method(&receiver, name, Callable::Constant(value))?;
                format!(":{name}")
            }
            ("clone", [var, new_var]) => {
                let copy = runtime.clone_value(&self.value(var)?)?;
                self.bind(new_var, copy)
            }
            ("dup", [var, new_var]) => {
                let copy = runtime.dup(&self.value(var)?)?;
                self.bind(new_var, copy)
            }
            ("freeze", [var]) => {
                let value = self.value(var)?;
                runtime.freeze(&value)?;
                runtime.inspect(&value)
            }
            ("id", [var]) => runtime.id_of(&self.value(var)?).to_string(),
            ("ancestors", [target]) => self.render_ancestors(self.module(target)?),
            ("stats", []) => {
                let stats = runtime.cache_stats();
                format!(
                    "hits: {}, misses: {}, invalidations: {}, entries: {}",
                    stats.hits, stats.misses, stats.invalidations, stats.entries,
                )
            }
            _ => bail!("unknown command or wrong arguments: `{line}`"),
        };

        Ok(Outcome::Print(output))
    }

    fn bind(&mut self, var: &str, value: Value) -> String {
        let rendered = self.runtime.inspect(&value);
        self.variables.insert(var.to_string(), value);
        rendered
    }

    fn render_ancestors(&self, module: ModuleId) -> String {
        let names: Vec<String> = self
            .runtime
            .ancestors(module)
            .into_iter()
            .map(|it| self.runtime.module_name(it))
            .collect();
        format!("[{}]", names.join(", "))
    }

    /// `Outer::Name` splits into the outer module and the last segment; a bare name lives in `Object`.
    fn split_path<'p>(&self, path: &'p str) -> Result<(ModuleId, &'p str), Error> {
        match path.rsplit_once("::") {
            Some((outer, name)) => Ok((self.runtime.resolve_path(outer)?, name)),
            None => Ok((self.runtime.core().object, path)),
        }
    }

    /// A literal, a shell variable or a constant path.
    fn value(&self, token: &str) -> Result<Value, Error> {
        let value = match token {
            "nil" => Value::Nil,
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => {
                if let Ok(value) = token.parse::<i64>() {
                    Value::Integer(value)
                } else if let Some(name) = token.strip_prefix(':') {
                    Value::Symbol(self.runtime.intern(name))
                } else if let Some(value) = self.variables.get(token) {
                    value.clone()
                } else if token.starts_with(|ch: char| ch.is_ascii_uppercase()) {
                    Value::Module(self.runtime.resolve_path(token)?)
                } else {
                    bail!("undefined variable `{token}`");
                }
            }
        };
        Ok(value)
    }

    fn module(&self, token: &str) -> Result<ModuleId, Error> {
        self.value(token)?
            .as_module()
            .with_context(|| format!("`{token}` is not a class or module"))
    }

    fn object(&self, token: &str) -> Result<rom_runtime::ObjRef, Error> {
        let value = self.value(token)?;
        self.runtime
            .heap_object(&value)
            .with_context(|| format!("`{token}` has no instance variables"))
    }
}

/// Runs every line of a script, printing results and errors.
pub fn batch(runtime: &Runtime, input: impl BufRead, verbose: bool) -> Result<(), Error> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut shell = Shell::new(runtime);

    for line in input.lines() {
        let line = line?;
        if !step(&mut shell, &mut stdout, &line, verbose)? {
            break;
        }
    }

    Ok(())
}

/// Launches an interactive Read-Eval-Print-Loop within the given runtime.
pub fn interactive(runtime: &Runtime, verbose: bool) -> Result<(), Error> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let mut shell = Shell::new(runtime);
    let mut counter = 0;
    let mut line = String::new();
    loop {
        write!(&mut stdout, "({}) ROM Shell | ", counter)?;
        stdout.flush()?;
        line.clear();
        stdin.read_line(&mut line)?;
        if line.is_empty() {
            writeln!(&mut stdout, "exit")?;
            break;
        }
        if !step(&mut shell, &mut stdout, &line, verbose)? {
            break;
        }
        counter += 1;
    }

    Ok(())
}

/// Runs one line; returns `false` once the shell should stop.
fn step(shell: &mut Shell<'_>, stdout: &mut impl Write, line: &str, verbose: bool) -> Result<bool, Error> {
    let start = Instant::now();
    let outcome = shell.execute(line);
    let elapsed = start.elapsed();

    match outcome {
        Ok(Outcome::Exit) => return Ok(false),
        Ok(Outcome::Silent) => return Ok(true),
        Ok(Outcome::Print(output)) => writeln!(stdout, "=> {output}")?,
        Err(err) => writeln!(stdout, "ERROR: {err}")?,
    }

    if verbose {
        writeln!(
            stdout,
            "Execution time: {} ms ({} µs)",
            elapsed.as_millis(),
            elapsed.as_micros(),
        )?;
        writeln!(stdout)?;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(shell: &mut Shell<'_>, line: &str) -> String {
        match shell.execute(line).unwrap() {
            Outcome::Print(output) => output,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn defines_and_calls_methods() {
        let runtime = Runtime::default();
        let mut shell = Shell::new(&runtime);

        assert_eq!(run(&mut shell, "class Point"), "Point");
        run(&mut shell, "def Point x 42");
        run(&mut shell, "new p Point");
        assert_eq!(run(&mut shell, "call p x"), "42");

        run(&mut shell, "private Point x");
        let err = shell.execute("call p x").unwrap_err();
        assert!(err.to_string().contains("private method 'x'"));
    }

    #[test]
    fn includes_modules() {
        let runtime = Runtime::default();
        let mut shell = Shell::new(&runtime);

        run(&mut shell, "class A");
        run(&mut shell, "module M");
        assert_eq!(
            run(&mut shell, "include A M # mixin"),
            "[A, M, Object, Kernel]"
        );
    }

    #[test]
    fn variables_and_copies() {
        let runtime = Runtime::default();
        let mut shell = Shell::new(&runtime);

        run(&mut shell, "class A");
        run(&mut shell, "new a A");
        run(&mut shell, "set a @x 1");
        run(&mut shell, "sdef a hello :hi");
        run(&mut shell, "clone a b");
        run(&mut shell, "dup a c");

        assert_eq!(run(&mut shell, "get b @x"), "1");
        assert_eq!(run(&mut shell, "call b hello"), ":hi");
        assert!(shell.execute("call c hello").is_err());
        assert_ne!(run(&mut shell, "id a"), run(&mut shell, "id b"));
    }

    #[test]
    fn comments_and_blank_lines_are_silent() {
        let runtime = Runtime::default();
        let mut shell = Shell::new(&runtime);

        assert_eq!(shell.execute("   # nothing").unwrap(), Outcome::Silent);
        assert_eq!(shell.execute("").unwrap(), Outcome::Silent);
        assert_eq!(shell.execute("exit").unwrap(), Outcome::Exit);
        assert!(shell.execute("frobnicate").is_err());
    }
}
