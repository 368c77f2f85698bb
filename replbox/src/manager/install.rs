//! Package installation into a box's lib/ directory.

use crate::runtime::options::SandboxOptions;
use regex::Regex;
use replbox_shared::constants::tools;
use replbox_shared::errors::{ReplboxError, ReplboxResult};
use std::ffi::OsString;
use std::path::Path;
use std::sync::LazyLock;

/// Names are interpolated into the installer's argv, so this guard is
/// a hard injection barrier, not a convenience check.
static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("package name pattern"));

/// Validate an install request before any process is spawned.
pub(crate) fn validate_packages(packages: &[String]) -> ReplboxResult<()> {
    if packages.is_empty() {
        return Err(ReplboxError::InvalidRequest("no packages to install".into()));
    }
    for pkg in packages {
        if !PACKAGE_NAME.is_match(pkg) {
            return Err(ReplboxError::InvalidRequest(format!(
                "invalid package name: {}",
                pkg
            )));
        }
    }
    Ok(())
}

/// Run the installer under the sandbox user, targeting the box's lib/.
///
/// `--no-deps` keeps installs deterministic: the caller names every
/// package it wants.
pub(crate) async fn run_installer(
    options: &SandboxOptions,
    lib_dir: &Path,
    packages: &[String],
) -> ReplboxResult<()> {
    let mut argv: Vec<OsString> = Vec::new();

    if let Some(user) = &options.sandbox_user {
        argv.push(tools::PRIVILEGE_WRAPPER.into());
        argv.push(user.into());
    }
    argv.push(tools::INSTALLER.into());
    argv.extend(tools::INSTALLER_ARGS.iter().map(OsString::from));
    argv.push(format!("--target={}", lib_dir.display()).into());
    argv.extend(packages.iter().map(OsString::from));

    let output = tokio::process::Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .await
        .map_err(|e| ReplboxError::InstallFailed(format!("failed to run installer: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReplboxError::InstallFailed(format!(
            "installer exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    tracing::info!(
        lib_dir = %lib_dir.display(),
        packages = ?packages,
        "packages installed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_names_pass() {
        validate_packages(&names(&["numpy", "scikit-learn", "ruamel.yaml", "typing_extensions"]))
            .unwrap();
    }

    #[test]
    fn empty_list_is_invalid() {
        let err = validate_packages(&[]).unwrap_err();
        assert!(matches!(err, ReplboxError::InvalidRequest(_)));
    }

    #[test]
    fn shell_metacharacters_are_rejected() {
        for bad in [
            "numpy; rm -rf /",
            "numpy && curl evil",
            "pkg$(id)",
            "pkg|tee",
            "../escape",
            "",
            "two words",
        ] {
            let err = validate_packages(&names(&["numpy", bad])).unwrap_err();
            assert!(
                matches!(err, ReplboxError::InvalidRequest(_)),
                "expected rejection of {:?}",
                bad
            );
        }
    }

    proptest! {
        #[test]
        fn any_name_with_a_foreign_character_is_rejected(
            prefix in "[a-zA-Z0-9_.-]{0,8}",
            bad in "[^a-zA-Z0-9_.-]",
            suffix in "[a-zA-Z0-9_.-]{0,8}",
        ) {
            let name = format!("{}{}{}", prefix, bad, suffix);
            let err = validate_packages(&[name]).unwrap_err();
            prop_assert!(matches!(err, ReplboxError::InvalidRequest(_)));
        }

        #[test]
        fn any_name_inside_the_alphabet_is_accepted(name in "[a-zA-Z0-9_.-]{1,32}") {
            validate_packages(&[name]).unwrap();
        }
    }
}
