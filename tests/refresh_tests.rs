//! In-place refresh and escalation to redeploy

mod common;

use common::*;
use deployer_core::artifact::{ArtifactDescriptor, ArtifactReference, VersionRange};
use deployer_core::constants::events;
use deployer_core::deployer::DeploymentOptions;
use deployer_core::error::ErrorKind;
use deployer_core::state_machine::ArtifactState;

fn count(codes: &[&str], code: &str) -> usize {
    codes.iter().filter(|c| **c == code).count()
}

#[test]
fn test_refresh_in_place_keeps_module_running() {
    let t = TestDeployment::new();
    let a = t.app(ArtifactDescriptor::module("a", "1.0.0"));
    let identity = t.deployer.deploy(&a, DeploymentOptions::default()).unwrap();

    t.app(ArtifactDescriptor::module("a", "1.0.0").with_property("colour", "green"));
    let mut rx = t.subscribe();
    assert_eq!(t.deployer.refresh(&a, "a").unwrap(), identity);

    let codes = drain_codes(&mut rx);
    assert!(codes.contains(&events::REFRESHED));
    assert!(!codes.contains(&events::REDEPLOY_ESCALATED));
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
    let module = t.runtime.modules_named("a")[0];
    assert_eq!(t.runtime.descriptor(module).unwrap().properties["colour"], "green");
    assert_eq!(t.runtime.start_count("a"), 1);
}

#[test]
fn test_identity_change_escalates_to_redeploy() {
    let t = TestDeployment::new();
    let a = t.app(ArtifactDescriptor::module("a", "1.0.0"));
    let old = t.deployer.deploy(&a, DeploymentOptions::default()).unwrap();

    t.app(ArtifactDescriptor::module("a", "2.0.0"));
    let mut rx = t.subscribe();
    let new = t.deployer.refresh(&a, "a").unwrap();

    assert!(drain_codes(&mut rx).contains(&events::REDEPLOY_ESCALATED));
    assert_eq!(new.version(), "2.0.0");
    assert_eq!(t.deployer.deployment_identities(), vec![new.clone()]);
    assert_eq!(t.deployer.state_of(&new), Some(ArtifactState::Active));
    assert_eq!(t.deployer.state_of(&old), None);
    assert_eq!(t.runtime.installed_count(), 1);
}

#[test]
fn test_runtime_update_failure_escalates() {
    let t = TestDeployment::new();
    let a = t.app(ArtifactDescriptor::module("a", "1.0.0"));
    let identity = t.deployer.deploy(&a, DeploymentOptions::default()).unwrap();
    t.runtime.fail_update("a", "class change");

    let mut rx = t.subscribe();
    assert_eq!(t.deployer.refresh(&a, "a").unwrap(), identity);
    let codes = drain_codes(&mut rx);
    assert!(codes.contains(&events::REFRESH_FAILED));
    assert!(codes.contains(&events::REDEPLOY_ESCALATED));
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
    assert_eq!(t.runtime.start_count("a"), 2);
}

#[test]
fn test_changed_plan_members_escalate() {
    let t = TestDeployment::new();
    t.repository(ArtifactDescriptor::module("x", "1.0.0"));
    t.repository(ArtifactDescriptor::module("y", "1.0.0"));
    let plan = t.app(
        ArtifactDescriptor::plan("p", "1.0.0", false)
            .with_child(ArtifactReference::module("x", VersionRange::any())),
    );
    t.deployer.deploy(&plan, DeploymentOptions::default()).unwrap();

    t.app(
        ArtifactDescriptor::plan("p", "1.0.0", false)
            .with_child(ArtifactReference::module("x", VersionRange::any()))
            .with_child(ArtifactReference::module("y", VersionRange::any())),
    );
    let mut rx = t.subscribe();
    t.deployer.refresh(&plan, "p").unwrap();

    assert!(drain_codes(&mut rx).contains(&events::REDEPLOY_ESCALATED));
    assert_eq!(t.installed_names(), vec!["p", "x", "y"]);
}

#[test]
fn test_scoped_member_refreshes_with_its_plan() {
    let t = TestDeployment::new();
    t.repository(ArtifactDescriptor::module("cart", "1.0.0"));
    let shop = t.app(
        ArtifactDescriptor::plan("shop", "1.0.0", true)
            .with_child(ArtifactReference::module("cart", VersionRange::any())),
    );
    let identity = t.deployer.deploy(&shop, DeploymentOptions::default()).unwrap();

    let mut rx = t.subscribe();
    assert_eq!(t.deployer.refresh(&shop, "cart").unwrap(), identity);
    let codes = drain_codes(&mut rx);
    assert_eq!(count(&codes, events::REFRESHED), 2);
    assert!(!codes.contains(&events::REDEPLOY_ESCALATED));
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
}

#[test]
fn test_refresh_module_finds_owning_deployment() {
    let t = TestDeployment::new();
    t.repository(ArtifactDescriptor::module("cart", "1.0.0"));
    let shop = t.app(
        ArtifactDescriptor::plan("shop", "1.0.0", true)
            .with_child(ArtifactReference::module("cart", VersionRange::any())),
    );
    let identity = t.deployer.deploy(&shop, DeploymentOptions::default()).unwrap();

    let mut rx = t.subscribe();
    assert_eq!(t.deployer.refresh_module("cart", "1.0.0").unwrap(), identity);
    assert_eq!(count(&drain_codes(&mut rx), events::REFRESHED), 2);
}

#[test]
fn test_refresh_of_unknown_member_does_not_redeploy() {
    let t = TestDeployment::new();
    let a = t.app(ArtifactDescriptor::module("a", "1.0.0"));
    t.deployer.deploy(&a, DeploymentOptions::default()).unwrap();

    let mut rx = t.subscribe();
    let err = t.deployer.refresh(&a, "nothing-here").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
    let codes = drain_codes(&mut rx);
    assert!(codes.contains(&events::ARTIFACT_NOT_FOUND));
    assert!(!codes.contains(&events::REDEPLOY_ESCALATED));

    let unknown = t.app(ArtifactDescriptor::module("never-deployed", "1.0.0"));
    let err = t.deployer.refresh(&unknown, "never-deployed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
}
