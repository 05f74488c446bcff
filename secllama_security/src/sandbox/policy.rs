//! Declarative, platform-agnostic runner permissions.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Directory name used for runner scratch space under the temp roots.
const RUNNER_DIR: &str = "secllama";

/// What a runner subprocess may touch. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxPolicy {
    allow_localhost: bool,
    allowed_ports: BTreeSet<u16>,
    working_directory: Option<PathBuf>,
    allowed_read_paths: BTreeSet<PathBuf>,
    allowed_write_paths: BTreeSet<PathBuf>,
}

impl SandboxPolicy {
    pub fn builder() -> SandboxPolicyBuilder {
        SandboxPolicyBuilder::default()
    }

    /// Default policy for a model runner serving on `port`.
    ///
    /// Loopback only on that port, working in `<tmp>/secllama`, with read and
    /// write access to `<tmp>/secllama` and `/var/tmp/secllama`.
    pub fn for_runner(port: u16) -> Self {
        let scratch = std::env::temp_dir().join(RUNNER_DIR);
        let var_tmp = Path::new("/var/tmp").join(RUNNER_DIR);

        Self::builder()
            .allow_localhost(true)
            .allow_port(port)
            .working_directory(&scratch)
            .allow_read(&scratch)
            .allow_read(&var_tmp)
            .allow_write(&scratch)
            .allow_write(&var_tmp)
            .build()
    }

    pub fn allow_localhost(&self) -> bool {
        self.allow_localhost
    }

    pub fn allowed_ports(&self) -> &BTreeSet<u16> {
        &self.allowed_ports
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn allowed_read_paths(&self) -> &BTreeSet<PathBuf> {
        &self.allowed_read_paths
    }

    pub fn allowed_write_paths(&self) -> &BTreeSet<PathBuf> {
        &self.allowed_write_paths
    }

    /// Ports that are actually reachable: none unless localhost is allowed.
    pub fn effective_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.allowed_ports
            .iter()
            .copied()
            .filter(|_| self.allow_localhost)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SandboxPolicyBuilder {
    policy: SandboxPolicy,
}

impl SandboxPolicyBuilder {
    pub fn allow_localhost(mut self, allow: bool) -> Self {
        self.policy.allow_localhost = allow;
        self
    }

    pub fn allow_port(mut self, port: u16) -> Self {
        self.policy.allowed_ports.insert(port);
        self
    }

    pub fn allow_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.policy.allowed_ports.extend(ports);
        self
    }

    pub fn working_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.policy.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn allow_read(mut self, path: impl AsRef<Path>) -> Self {
        self.policy
            .allowed_read_paths
            .insert(path.as_ref().to_path_buf());
        self
    }

    pub fn allow_write(mut self, path: impl AsRef<Path>) -> Self {
        self.policy
            .allowed_write_paths
            .insert(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> SandboxPolicy {
        self.policy
    }
}
