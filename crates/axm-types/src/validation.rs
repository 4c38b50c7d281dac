//! Input validation for create and update requests
//!
//! Every check returns a structured [`ValidationError`] naming the offending
//! field; nothing here touches storage.

use crate::attachment::{AttachmentType, ContextAttachment};
use crate::error::ValidationError;
use crate::profile::{AgentProfile, CreateProfileRequest};
use crate::scope::ScopePath;
use crate::task::{CreateTaskRequest, Task};
use uuid::Uuid;

/// Maximum length of profile names and task titles
pub const MAX_NAME_LEN: usize = 100;

/// Non-empty, at most [`MAX_NAME_LEN`] characters
pub fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::new(
            field,
            format!("is {len} characters, maximum is {MAX_NAME_LEN}"),
        ));
    }
    Ok(())
}

/// Parse a well-formed UUID
pub fn validate_uuid(field: &str, raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| ValidationError::new(field, format!("malformed uuid '{raw}': {e}")))
}

fn overlap_error(field: &str, overlap: &[&str]) -> ValidationError {
    ValidationError::new(
        field,
        format!("entries both allowed and denied: {}", overlap.join(", ")),
    )
    .with_hint("remove each entry from one of the two lists")
}

fn validate_disjoint(
    field: &str,
    allowed: &[String],
    denied: &[String],
) -> Result<(), ValidationError> {
    let overlap: Vec<&str> = allowed
        .iter()
        .filter(|a| denied.contains(a))
        .map(String::as_str)
        .collect();
    if overlap.is_empty() {
        Ok(())
    } else {
        Err(overlap_error(field, &overlap))
    }
}

fn parse_paths(field: &str, paths: &[String]) -> Result<Vec<ScopePath>, ValidationError> {
    paths
        .iter()
        .map(|path| ScopePath::parse(path).map_err(|e| ValidationError::new(field, e.message)))
        .collect()
}

/// Path lists are compared after normalization, so `/repo` and `/repo/` clash
fn validate_path_lists(allowed: &[String], denied: &[String]) -> Result<(), ValidationError> {
    let allowed_scopes = parse_paths("allowedPaths", allowed)?;
    let denied_scopes = parse_paths("deniedPaths", denied)?;
    let overlap: Vec<&str> = allowed
        .iter()
        .zip(&allowed_scopes)
        .filter(|(_, scope)| denied_scopes.contains(scope))
        .map(|(raw, _)| raw.as_str())
        .collect();
    if overlap.is_empty() {
        Ok(())
    } else {
        Err(overlap_error("allowedPaths", &overlap))
    }
}

fn validate_profile_fields(
    name: &str,
    timeout_secs: u64,
    allowed_tools: &[String],
    denied_tools: &[String],
    allowed_paths: &[String],
    denied_paths: &[String],
) -> Result<(), ValidationError> {
    validate_name("name", name)?;
    if timeout_secs == 0 {
        return Err(ValidationError::new("timeout", "must be greater than zero"));
    }
    validate_disjoint("allowedTools", allowed_tools, denied_tools)?;
    validate_path_lists(allowed_paths, denied_paths)
}

/// Validate a profile create request
pub fn validate_profile_request(request: &CreateProfileRequest) -> Result<(), ValidationError> {
    validate_profile_fields(
        &request.name,
        request.timeout_secs,
        &request.allowed_tools,
        &request.denied_tools,
        &request.allowed_paths,
        &request.denied_paths,
    )
}

/// Validate a full profile (after a partial update)
pub fn validate_profile(profile: &AgentProfile) -> Result<(), ValidationError> {
    validate_profile_fields(
        &profile.name,
        profile.timeout_secs,
        &profile.allowed_tools,
        &profile.denied_tools,
        &profile.allowed_paths,
        &profile.denied_paths,
    )
}

/// Validate one attachment; `index` locates it in error messages
pub fn validate_attachment(
    index: usize,
    attachment: &ContextAttachment,
) -> Result<(), ValidationError> {
    let field = format!("contextAttachments[{index}]");
    match attachment.attachment_type {
        AttachmentType::File if attachment.path.as_deref().map_or(true, str::is_empty) => {
            Err(ValidationError::new(field, "file attachment requires a path"))
        }
        AttachmentType::Link if attachment.url.as_deref().map_or(true, str::is_empty) => {
            Err(ValidationError::new(field, "link attachment requires a url"))
        }
        _ => Ok(()),
    }
}

fn validate_task_fields(
    title: &str,
    scope_path: &str,
    attachments: &[ContextAttachment],
) -> Result<(), ValidationError> {
    validate_name("title", title)?;
    ScopePath::parse(scope_path)?;
    for (i, attachment) in attachments.iter().enumerate() {
        validate_attachment(i, attachment)?;
    }
    Ok(())
}

/// Validate a task create request
pub fn validate_task_request(request: &CreateTaskRequest) -> Result<(), ValidationError> {
    validate_task_fields(
        &request.title,
        &request.scope_path,
        &request.context_attachments,
    )
}

/// Validate a full task (after a partial update)
pub fn validate_task(task: &Task) -> Result<(), ValidationError> {
    validate_task_fields(&task.title, &task.scope_path, &task.context_attachments)
}

/// Check that `profile` may operate on the scope of `task`
///
/// A denied path covering the scope is an error; when the profile lists
/// allowed paths, the scope must lie within one of them.
pub fn validate_compatibility(task: &Task, profile: &AgentProfile) -> Result<(), ValidationError> {
    let scope = ScopePath::parse(&task.scope_path)?;

    for denied in &profile.denied_paths {
        let denied_scope = ScopePath::parse(denied)
            .map_err(|e| ValidationError::new("deniedPaths", e.message))?;
        if scope.is_within(&denied_scope) {
            return Err(ValidationError::new(
                "scopePath",
                format!("profile '{}' denies path {denied_scope}", profile.name),
            )
            .with_hint("choose a profile that allows this scope"));
        }
    }

    if !profile.allowed_paths.is_empty() {
        let mut allowed = false;
        for path in &profile.allowed_paths {
            let allowed_scope = ScopePath::parse(path)
                .map_err(|e| ValidationError::new("allowedPaths", e.message))?;
            if scope.is_within(&allowed_scope) {
                allowed = true;
                break;
            }
        }
        if !allowed {
            return Err(ValidationError::new(
                "scopePath",
                format!(
                    "{scope} is outside the allowed paths of profile '{}'",
                    profile.name
                ),
            ));
        }
    }

    Ok(())
}
