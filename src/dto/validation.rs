//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted group name.
pub const MAX_GROUP_NAME_LEN: usize = 64;

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates eligible group names: at least one, none blank, none longer than
/// [`MAX_GROUP_NAME_LEN`], and no commas since the actor header is comma separated.
///
/// # Examples
///
/// ```ignore
/// validate_group_names(&["IU7-51".into()])  // Ok
/// validate_group_names(&[])                 // Err - empty
/// validate_group_names(&["a,b".into()])     // Err - comma
/// ```
pub fn validate_group_names(groups: &[String]) -> Result<(), ValidationError> {
    if groups.is_empty() {
        let mut err = ValidationError::new("groups_empty");
        err.message = Some("at least one eligible group is required".into());
        return Err(err);
    }

    for group in groups {
        let name = group.trim();
        if name.is_empty() {
            let mut err = ValidationError::new("group_blank");
            err.message = Some("group names must not be blank".into());
            return Err(err);
        }
        if name.chars().count() > MAX_GROUP_NAME_LEN {
            let mut err = ValidationError::new("group_length");
            err.message = Some(
                format!("group name `{name}` exceeds {MAX_GROUP_NAME_LEN} characters").into(),
            );
            return Err(err);
        }
        if name.contains(',') {
            let mut err = ValidationError::new("group_format");
            err.message = Some(format!("group name `{name}` must not contain commas").into());
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_validate_group_names_valid() {
        assert!(validate_group_names(&groups(&["IU7-51"])).is_ok());
        assert!(validate_group_names(&groups(&["IU7-51", " IU7-52 "])).is_ok());
    }

    #[test]
    fn test_validate_group_names_invalid() {
        assert!(validate_group_names(&[]).is_err());
        assert!(validate_group_names(&groups(&["  "])).is_err());
        assert!(validate_group_names(&groups(&["IU7-51,IU7-52"])).is_err());
        assert!(validate_group_names(&groups(&[&"x".repeat(65)])).is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Lab 1").is_ok());
        assert!(validate_not_blank(" \t").is_err());
    }
}
