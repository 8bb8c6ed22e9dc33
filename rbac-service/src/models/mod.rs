pub mod audit_log;
pub mod group;
pub mod one_time_token;
pub mod permission;
pub mod user;

pub use audit_log::{AuditEvent, AuditLog, NewAuditLog};
pub use group::{
    ChangeAction, CreateGroupRequest, Group, GroupMember, GroupResponse, MembershipChangeRequest,
    PatchGroupRequest, PermissionChangeRequest,
};
pub use one_time_token::{OneTimeToken, OneTimeTokenKind};
pub use permission::{perms, Permission};
pub use user::{
    CreateUserRequest, LoginRequest, LoginResponse, PatchUserRequest,
    RequestPasswordResetRequest, ResetPasswordRequest, SignupRequest, User, UserPatch,
    UserResponse, VerifyEmailRequest,
};
