//! Git exec command parsing.
//!
//! Only the two smart-protocol verbs are accepted. The repository argument is
//! reduced to its last path segment and re-rooted under the configured
//! repository directory.

use std::fmt::{Display, Formatter};

use gitgate_core::project_name;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitVerb {
    /// `git-receive-pack` (push)
    ReceivePack,
    /// `git-upload-pack` (fetch/clone)
    UploadPack,
}

impl GitVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceivePack => "git-receive-pack",
            Self::UploadPack => "git-upload-pack",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "git-receive-pack" => Some(Self::ReceivePack),
            "git-upload-pack" => Some(Self::UploadPack),
            _ => None,
        }
    }
}

impl Display for GitVerb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("only git-receive-pack and git-upload-pack are allowed, got {0:?}")]
    UnsupportedCommand(String),
    #[error("missing repository argument")]
    MissingRepository,
    #[error("invalid repository name {0:?}")]
    InvalidRepository(String),
}

/// An accepted `exec` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    pub verb: GitVerb,
    /// Last path segment of the requested repository, quotes removed.
    pub repository: String,
}

impl GitCommand {
    pub fn parse(command: &str) -> Result<Self, CommandError> {
        let mut parts = command.split_whitespace();

        let verb = parts.next().unwrap_or_default();
        let verb = GitVerb::from_token(verb)
            .ok_or_else(|| CommandError::UnsupportedCommand(verb.to_owned()))?;

        let path = parts.next().ok_or(CommandError::MissingRepository)?;
        let path = path.replace('\'', "");
        let repository = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();

        if repository.is_empty() || repository == "." || repository == ".." {
            return Err(CommandError::InvalidRepository(path));
        }

        Ok(Self {
            verb,
            repository: repository.to_owned(),
        })
    }

    /// Name the authorization service knows the repository by.
    pub fn project_name(&self) -> String {
        project_name(&self.repository)
    }

    /// `<verb> '<root><repository>'`, as understood by `git-shell -c`.
    pub fn shell_command(&self, repository_root: &str) -> String {
        format!("{} '{}{}'", self.verb, repository_root, self.repository)
    }

    pub fn to_process(&self, shell: &str, repository_root: &str) -> Command {
        let mut command = Command::new(shell);
        command.arg("-c").arg(self.shell_command(repository_root));
        command
    }
}
