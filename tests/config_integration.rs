//! End-to-end patch definition workflow: load a TOML patch file, apply it
//! to a workspace, re-apply for idempotency, and check status.

use anchor_patcher::config::{apply_patches, check_patches, load_from_path, PatchResult};
use std::fs;
use tempfile::TempDir;

const ROUTES: &str = r#"fun joinRoom(roomId: String) {
    val currentMembership = membership(roomId)
    // If user has a pending invite, handle federated join
    val inviterServer = inviteSender.substringAfter(":")
    remoteJoin(roomId, inviterServer)
    // For local joins (no invite), check if room exists
    localJoin(roomId)
}
"#;

const REPLACEMENT: &str = r#"// If user has a pending invite, redirect to make_join flow
    val effectiveServerNames = if (currentMembership == "invite") {
        listOf(inviteSender.substringAfter(":"))
    } else {
        serverNames
    }
    // For local joins (no invite), check if room exists"#;

/// Workspace with one route file and one patch definition.
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir_all(dir.path().join("routes")).unwrap();
    fs::write(dir.path().join("routes/RoomMembershipRoutes.kt"), ROUTES).unwrap();

    let patches_dir = dir.path().join("patches");
    fs::create_dir(&patches_dir).unwrap();
    fs::write(
        patches_dir.join("membership.toml"),
        format!(
            r#"[meta]
name = "membership-routes"
description = "Route invite acceptance through make_join"
workspace_relative = true

[[patches]]
id = "redirect-invite-join"
file = "routes/RoomMembershipRoutes.kt"
replacement = '''{REPLACEMENT}'''
marker = "inviterServer"

[patches.span]
start_anchor = "// If user has a pending invite, handle federated join"
end_anchor = "// For local joins (no invite), check if room exists"
"#
        ),
    )
    .unwrap();

    dir
}

#[test]
fn apply_patches_end_to_end() {
    let workspace = setup_workspace();
    let config = load_from_path(workspace.path().join("patches/membership.toml")).unwrap();

    let results = apply_patches(&config, workspace.path());
    assert_eq!(results.len(), 1);

    let (id, result) = &results[0];
    assert_eq!(id, "redirect-invite-join");
    match result.as_ref().unwrap() {
        PatchResult::Applied { matches, marker, .. } => {
            assert_eq!(*matches, 1);
            // Both inviterServer references removed by the rewrite
            assert_eq!(marker.as_ref().unwrap().removed(), 2);
        }
        other => panic!("expected Applied, got {other:?}"),
    }

    let patched =
        fs::read_to_string(workspace.path().join("routes/RoomMembershipRoutes.kt")).unwrap();
    assert!(patched.contains("redirect to make_join flow"));
    assert!(!patched.contains("handle federated join"));
    // Text outside the span untouched
    assert!(patched.starts_with("fun joinRoom(roomId: String) {"));
    assert!(patched.ends_with("localJoin(roomId)\n}\n"));
}

#[test]
fn reapplying_reports_already_applied() {
    let workspace = setup_workspace();
    let config = load_from_path(workspace.path().join("patches/membership.toml")).unwrap();

    apply_patches(&config, workspace.path());

    let second = apply_patches(&config, workspace.path());
    assert!(matches!(
        second[0].1.as_ref().unwrap(),
        PatchResult::AlreadyApplied { .. }
    ));
}

#[test]
fn check_reports_pending_then_applied() {
    let workspace = setup_workspace();
    let config = load_from_path(workspace.path().join("patches/membership.toml")).unwrap();

    let before = check_patches(&config, workspace.path());
    assert!(matches!(
        before[0].1.as_ref().unwrap(),
        PatchResult::Applied { .. }
    ));

    // check is read-only
    let content =
        fs::read_to_string(workspace.path().join("routes/RoomMembershipRoutes.kt")).unwrap();
    assert_eq!(content, ROUTES);

    apply_patches(&config, workspace.path());

    let after = check_patches(&config, workspace.path());
    assert!(matches!(
        after[0].1.as_ref().unwrap(),
        PatchResult::AlreadyApplied { .. }
    ));
}
