// src/exec/command.rs

//! Argument vector for one simulation process.

use std::path::Path;

use tokio::process::Command;

use crate::config::SimulationConfig;

/// Solver/vector/matrix backend flags appended when GPU execution is
/// requested. Order matters to the simulation's option parser.
pub const GPU_BACKEND_FLAGS: &[&str] = &[
    "-vec_type",
    "cuda",
    "-mat_type",
    "aijcusparse",
    "-dm_vec_type",
    "cuda",
    "-dm_mat_type",
    "aijcusparse",
    "-flow_vec_type",
    "cuda",
    "-flow_mat_type",
    "aijcusparse",
    "-snes_type",
    "newtonls",
    "-ksp_type",
    "cg",
    "-pc_type",
    "jacobi",
];

/// `[mpirun [-n <procs>]] <binary> [-screen_output off] [GPU flags...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationCommand {
    program: String,
    args: Vec<String>,
}

impl SimulationCommand {
    pub fn from_config(cfg: &SimulationConfig) -> Self {
        let mut argv: Vec<String> = Vec::new();

        if cfg.mpirun {
            argv.push("mpirun".to_string());
            if let Some(procs) = cfg.mpirun_procs {
                argv.push("-n".to_string());
                argv.push(procs.to_string());
            }
        }
        argv.push(cfg.binary.clone());

        if cfg.mute_output {
            argv.push("-screen_output".to_string());
            argv.push("off".to_string());
        }
        if cfg.gpu {
            argv.extend(GPU_BACKEND_FLAGS.iter().map(|s| s.to_string()));
        }

        let program = argv.remove(0);
        Self {
            program,
            args: argv,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector including the program.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Space-joined argv, as shown to operators.
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }

    /// Tokio command running in `cwd`; stdio is left to the caller.
    pub fn to_tokio(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(cwd);
        cmd
    }
}
