//! A shell script standing in for `Rscript`.
//!
//! It understands just enough of the command lines the agent builds:
//! - `<file> [args]` runs the file with `sh`, unless it holds an inspection request
//! - `-e 'source("f"); save.image("img")' [args]` runs `f` with `sh`, then writes `img`
//! - `load(...) ...`, inline or from a file, answers inspection markers; object `x`
//!   exists, nothing else does
//! - any other `-e` expression is echoed back

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rwork::{Agent, Config};
use tempfile::TempDir;

const FAKE_RSCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "-e" ]; then
  code=$2
  shift 2
else
  code=$(cat "$1" 2>/dev/null)
  case "$code" in
    load\(*) shift ;;
    *) exec sh "$@" ;;
  esac
fi
case "$code" in
  load\(*)
    if printf '%s' "$code" | grep -q ':listing@@'; then
      printf '%s' "$code" | grep -o '@@rwork:[0-9a-f]*:listing@@'
      printf 'x\ny\n'
      exit 0
    fi
    printf '%s' "$code" | grep -o '@@rwork:[0-9a-f]*:object:[0-9]*:[^@]*@@' | while read -r marker; do
      printf '%s\n' "$marker"
      case "$marker" in
        *:x@@) printf ' num 42\n' ;;
        *) printf '%s\n' "$marker" | sed 's/:object:.*$/:not-found@@/' ;;
      esac
    done
    ;;
  source\(*)
    file=$(printf '%s' "$code" | sed 's/^source("\([^"]*\)").*$/\1/')
    sh "$file" "$@" || exit $?
    image=$(printf '%s' "$code" | sed -n 's/.*save\.image("\([^"]*\)").*/\1/p')
    if [ -n "$image" ]; then
      printf 'RDX3' > "$image"
    fi
    ;;
  *)
    printf '[1] %s\n' "$code"
    ;;
esac
"#;

/// Installs the fake interpreter as `<dir>/Rscript`.
pub fn install_fake_rscript(dir: &Path) -> PathBuf {
    let path = dir.join("Rscript");
    std::fs::write(&path, FAKE_RSCRIPT).expect("failed to write fake Rscript");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod fake Rscript");
    path
}

/// A workspace directory plus an agent wired to the fake interpreter.
pub struct Fixture {
    pub bin: TempDir,
    pub workspace: TempDir,
    pub agent: Agent,
}

impl Fixture {
    pub fn new() -> Self {
        let bin = TempDir::new().expect("failed to create bin dir");
        let workspace = TempDir::new().expect("failed to create workspace dir");
        let rscript = install_fake_rscript(bin.path());

        let mut config = Config::default();
        config.interpreter.candidates = vec![rscript.to_string_lossy().into_owned()];

        Self {
            bin,
            workspace,
            agent: Agent::new(config),
        }
    }

    /// Binds the workspace directory.
    pub fn bound() -> Self {
        let fixture = Self::new();
        fixture
            .agent
            .set_workspace(fixture.workspace.path(), false)
            .expect("failed to bind workspace");
        fixture
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.workspace.path().join(name)
    }
}
