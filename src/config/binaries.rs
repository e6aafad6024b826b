use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// One external program and its argument template
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProgramSpec {
    pub fn new(
        program: impl Into<String>,
        args: &[&str],
    ) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Launch surface of the cluster under test.
///
/// Node templates accept `{client}`, `{control}` and `{leader}`; the ctl
/// template accepts `{target}`, `{verb}` and `{arg}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BinariesConfig {
    #[serde(default = "default_leader")]
    pub leader: ProgramSpec,

    #[serde(default = "default_kvs")]
    pub kvs: ProgramSpec,

    #[serde(default = "default_ctl")]
    pub ctl: ProgramSpec,

    /// Directory for per-node stdout/stderr files; discarded when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            leader: default_leader(),
            kvs: default_kvs(),
            ctl: default_ctl(),
            output_dir: None,
        }
    }
}

impl BinariesConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, spec) in [("leader", &self.leader), ("kvs", &self.kvs), ("ctl", &self.ctl)] {
            if spec.program.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("binaries.{name}.program cannot be empty")));
            }
        }

        if !self.kvs.args.iter().any(|a| a.contains("{leader}")) {
            return Err(Error::InvalidConfig(
                "binaries.kvs.args must pass the {leader} address".into(),
            ));
        }

        if !self.ctl.args.iter().any(|a| a.contains("{target}"))
            || !self.ctl.args.iter().any(|a| a.contains("{verb}"))
        {
            return Err(Error::InvalidConfig(
                "binaries.ctl.args must contain {target} and {verb}".into(),
            ));
        }

        Ok(())
    }
}

fn default_leader() -> ProgramSpec {
    ProgramSpec::new("./leader", &["{client}", "{control}"])
}
fn default_kvs() -> ProgramSpec {
    ProgramSpec::new("./kvs", &["{client}", "{control}", "{leader}"])
}
fn default_ctl() -> ProgramSpec {
    ProgramSpec::new("./ctl", &["{target}", "{verb}", "{arg}"])
}
