use crate::auth::session::Role;
use crate::modbus::protocol::FunctionCode;
use crate::utils::error::ConsoleError;

pub const READ_ONLY_WARNING: &str = "You have read-only access. Some features are limited.";

/// Permission the API demands for raw Modbus commands.
pub const WRITE_PERMISSION: &str = "write";

/// Actions the console gates on the session's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewData,
    BuildCommand,
    SendCommand(FunctionCode),
    ListSessions,
    ChangePassword,
}

impl Operation {
    fn describe(self) -> String {
        match self {
            Operation::ViewData => "viewing meter data".to_string(),
            Operation::BuildCommand => "building Modbus commands".to_string(),
            Operation::SendCommand(function) => format!("sending {}", function.name()),
            Operation::ListSessions => "listing active sessions".to_string(),
            Operation::ChangePassword => "changing the password".to_string(),
        }
    }
}

/// Client-side restrictions derived from a role. The API server stays the
/// authority; this only keeps the console from offering what it would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    read_only: bool,
    admin: bool,
}

impl AccessPolicy {
    pub fn for_role(role: &Role) -> Self {
        Self {
            read_only: *role == Role::Viewer,
            admin: *role == Role::Admin,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::ViewData | Operation::ChangePassword => true,
            Operation::BuildCommand | Operation::SendCommand(_) => !self.read_only,
            Operation::ListSessions => self.admin,
        }
    }

    pub fn check(&self, operation: Operation) -> Result<(), ConsoleError> {
        if self.allows(operation) {
            return Ok(());
        }
        let reason = if self.read_only {
            "read-only access - contact administrator"
        } else {
            "admin only"
        };
        Err(ConsoleError::PermissionDenied(format!(
            "{} is not allowed ({})",
            operation.describe(),
            reason
        )))
    }

    /// Function codes the operator may send.
    pub fn allowed_functions(&self) -> Vec<FunctionCode> {
        FunctionCode::ALL
            .into_iter()
            .filter(|function| self.allows(Operation::SendCommand(*function)))
            .collect()
    }

    pub fn warning(&self) -> Option<&'static str> {
        self.read_only.then_some(READ_ONLY_WARNING)
    }
}
