//! Arcfile project template emitter (`--generate`).

use std::fs;
use std::io;
use std::path::Path;

/// Default project template: profiles, interpreter and threading
/// directives, glob + map variables, an assert and skeleton tasks.
const ARCFILE_TEMPLATE: &str = r#"#!/usr/bin/arcana

using profiles Debug Release;
using default interpreter /bin/bash;
using threads 1;

@profile Debug;   FLAGS = -Wall -g3 -O0
@profile Release; FLAGS = -Wall -g0 -O2

COMPILER = gcc
INCLUDES = -Iincludes
SRCDIR   = src
OBJDIR   = src
TARGET   = app

@glob
SOURCES  = {arc:SRCDIR}/*.c
OBJECTS  = {arc:OBJDIR}/*.o

map SOURCES -> OBJECTS;

assert "{arc:__os__}" eq "linux" -> "This project can only be built under linux, {arc:__os__} not admitted";

###########################
# PRIVATE TASKS
###########################


@echo
@cache track {arc:list:SOURCES}
@multithread
task Compile()
{
{arc:COMPILER} {arc:FLAGS} {arc:INCLUDES} -c {arc:list:SOURCES} -o {arc:list:OBJECTS}
}

@cache store {arc:list:SOURCES}
task Link()
{
{arc:COMPILER} {arc:FLAGS} {arc:inline:OBJECTS} -o {arc:TARGET}
}

###########################
# PUBLIC TASKS
###########################

@pub
@cache untrack {arc:list:SOURCES}
task Clean()
{
rm -rf {arc:TARGET}
}

@pub
@main Compile Link
task Build() {}

@pub
@requires Clean Build
task Rebuild() {}

@pub
@requires Rebuild
task Install()
{

}
"#;

/// Emits the project template.
///
/// An empty destination defaults to `arcfile`; the literal `stdout`
/// prints the template instead of writing a file. Parent directories
/// are created as needed.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be written.
pub fn generate(output: &str) -> io::Result<()> {
    let output = if output.is_empty() { "arcfile" } else { output };

    if output == "stdout" {
        print!("{ARCFILE_TEMPLATE}");
        return Ok(());
    }

    let path = Path::new(output);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, ARCFILE_TEMPLATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_writes_file_with_parents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/project/arcfile");

        generate(&target.to_string_lossy()).unwrap();

        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("using profiles Debug Release"));
        assert!(content.contains("map SOURCES -> OBJECTS"));
    }

    #[test]
    fn test_template_parses() {
        let env = crate::parser::parse_source("template", ARCFILE_TEMPLATE).unwrap();

        assert_eq!(env.profiles, vec!["Debug", "Release"]);
        assert_eq!(env.interpreter, "/bin/bash");
        assert_eq!(env.threads, 1);
        assert!(env.vtable.contains_key("FLAGS@@Debug"));
        assert!(env.vtable.contains_key("FLAGS@@Release"));
        assert!(env.ftable.contains_key("Build"));
        assert!(env.ftable.contains_key("Rebuild"));
        assert_eq!(env.asserts.len(), 1);
        assert_eq!(env.mappings.len(), 1);
    }
}
