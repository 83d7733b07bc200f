//! Synchronous and asynchronous starts: waiting, timeouts, aborts and failures

mod common;

use common::*;
use deployer_core::artifact::{ArtifactDescriptor, ArtifactReference, VersionRange};
use deployer_core::constants::events;
use deployer_core::deployer::DeploymentOptions;
use deployer_core::error::ErrorKind;
use deployer_core::state_machine::{Activation, ArtifactState};
use std::time::{Duration, Instant};

#[test]
fn test_synchronous_deploy_waits_for_delayed_activation() {
    let t = TestDeployment::new();
    t.runtime
        .set_activation("slow", Activation::Delayed(Duration::from_millis(100)));
    let slow = t.app(ArtifactDescriptor::module("slow", "1.0.0"));

    let started = Instant::now();
    let identity = t.deployer.deploy(&slow, DeploymentOptions::default()).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
}

#[test]
fn test_oversized_start_timeout_waits_for_activation() {
    let t = TestDeployment::with_timeout(Duration::from_secs(u64::MAX));
    t.runtime
        .set_activation("patient", Activation::Delayed(Duration::from_millis(30)));
    let patient = t.app(ArtifactDescriptor::module("patient", "1.0.0"));

    let identity = t.deployer.deploy(&patient, DeploymentOptions::default()).unwrap();
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
}

#[test]
fn test_timeout_is_reported_and_start_continues() {
    let t = TestDeployment::with_timeout(Duration::from_millis(50));
    t.runtime.set_activation("stuck", Activation::Manual);
    let stuck = t.app(ArtifactDescriptor::module("stuck", "1.0.0"));
    let mut rx = t.subscribe();

    let identity = t.deployer.deploy(&stuck, DeploymentOptions::default()).unwrap();
    let codes = drain_codes(&mut rx);
    assert!(codes.contains(&events::START_TIMED_OUT));
    assert!(!codes.contains(&events::START_ABORTED));
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Starting));

    // The deployment stays and completes later
    assert!(t.runtime.complete_start("stuck"));
    assert!(wait_for(START_TIMEOUT, || {
        t.deployer.state_of(&identity) == Some(ArtifactState::Active)
    }));
}

#[test]
fn test_abort_is_reported_distinctly_from_timeout() {
    let t = TestDeployment::new();
    t.runtime.set_activation("flaky", Activation::Abort);
    let flaky = t.app(ArtifactDescriptor::module("flaky", "1.0.0"));
    let mut rx = t.subscribe();

    let identity = t.deployer.deploy(&flaky, DeploymentOptions::default()).unwrap();
    let codes = drain_codes(&mut rx);
    assert!(codes.contains(&events::START_ABORTED));
    assert!(!codes.contains(&events::START_TIMED_OUT));
    assert!(t.deployer.is_deployed(&flaky));
    assert_ne!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
}

#[test]
fn test_start_failure_undeploys_and_returns_cause() {
    let t = TestDeployment::new();
    t.runtime
        .set_activation("broken", Activation::Fail("activator threw".to_string()));
    let broken = t.app(ArtifactDescriptor::module("broken", "1.0.0"));
    let mut rx = t.subscribe();

    let err = t
        .deployer
        .deploy(&broken, DeploymentOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.to_string().contains("activator threw"));
    assert!(drain_codes(&mut rx).contains(&events::START_FAILED));
    assert!(!t.deployer.is_deployed(&broken));
    assert_eq!(t.runtime.installed_count(), 0);
    assert!(t.deployer.recovery_log().is_empty());
}

#[test]
fn test_asynchronous_deploy_returns_before_activation() {
    let t = TestDeployment::new();
    t.runtime.set_activation("lazy", Activation::Manual);
    let lazy = t.app(ArtifactDescriptor::module("lazy", "1.0.0"));

    let identity = t
        .deployer
        .deploy(&lazy, DeploymentOptions::asynchronous())
        .unwrap();
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Starting));

    assert!(t.runtime.complete_start("lazy"));
    assert!(wait_for(START_TIMEOUT, || {
        t.deployer.state_of(&identity) == Some(ArtifactState::Active)
    }));
}

#[test]
fn test_plan_is_active_only_after_every_member() {
    let t = TestDeployment::new();
    t.repository(ArtifactDescriptor::module("fast", "1.0.0"));
    t.repository(ArtifactDescriptor::module("slow", "1.0.0"));
    t.runtime
        .set_activation("slow", Activation::Delayed(Duration::from_millis(80)));
    let plan = t.app(
        ArtifactDescriptor::plan("suite", "1.0.0", false)
            .with_child(ArtifactReference::module("fast", VersionRange::any()))
            .with_child(ArtifactReference::module("slow", VersionRange::any())),
    );

    let started = Instant::now();
    let identity = t.deployer.deploy(&plan, DeploymentOptions::default()).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(t.deployer.state_of(&identity), Some(ArtifactState::Active));
    assert_eq!(t.runtime.start_count("fast"), 1);
    assert_eq!(t.runtime.start_count("slow"), 1);
}

#[test]
fn test_failing_plan_member_rolls_back_whole_plan() {
    let t = TestDeployment::new();
    t.repository(ArtifactDescriptor::module("good", "1.0.0"));
    t.repository(ArtifactDescriptor::module("bad", "1.0.0"));
    t.runtime
        .set_activation("bad", Activation::Fail("no database".to_string()));
    let plan = t.app(
        ArtifactDescriptor::plan("suite", "1.0.0", false)
            .with_child(ArtifactReference::module("good", VersionRange::any()))
            .with_child(ArtifactReference::module("bad", VersionRange::any())),
    );

    let err = t
        .deployer
        .deploy(&plan, DeploymentOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(t.installed_names().is_empty());
    assert_eq!(t.runtime.installed_count(), 0);
}
