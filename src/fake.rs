//! Scripted in-memory `ControlApi` for state machine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::api::{
    ActionReply, CatalogListing, ControlApi, DriveStatus, EnumerationUnit, ImageRef, VersionInfo,
};
use crate::error::ApiError;
use crate::scheduler::{Completion, Scheduler};

enum Outcome<T> {
    Reply(T),
    Unavailable,
    Malformed,
    /// Never answers
    Hang,
}

struct Scripted<T> {
    delay: Duration,
    outcome: Outcome<T>,
}

type Script<T> = Mutex<VecDeque<Scripted<T>>>;

/// Each endpoint answers from its own queue; an exhausted queue answers 503.
#[derive(Default)]
pub(crate) struct FakeApi {
    statuses: Script<DriveStatus>,
    ejects: Script<ActionReply>,
    units: Script<EnumerationUnit>,
    listings: Script<CatalogListing>,
    mounts: Script<ActionReply>,
    versions: Script<VersionInfo>,
    status_calls: AtomicUsize,
    eject_calls: AtomicUsize,
    next_image_calls: AtomicUsize,
    images_calls: AtomicUsize,
    mounted: Mutex<Vec<String>>,
}

fn push<T>(script: &Script<T>, delay: Duration, outcome: Outcome<T>) {
    script.lock().unwrap().push_back(Scripted { delay, outcome });
}

fn answer<T: Send + 'static>(
    script: &Script<T>,
    endpoint: &'static str,
) -> BoxFuture<'static, Result<T, ApiError>> {
    let scripted = script.lock().unwrap().pop_front().unwrap_or(Scripted {
        delay: Duration::ZERO,
        outcome: Outcome::Unavailable,
    });

    async move {
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        match scripted.outcome {
            Outcome::Reply(value) => Ok(value),
            Outcome::Unavailable => Err(ApiError::Status(503)),
            Outcome::Malformed => Err(ApiError::Malformed {
                endpoint,
                payload: "{\"bogus\":true}".to_string(),
            }),
            Outcome::Hang => futures::future::pending().await,
        }
    }
    .boxed()
}

impl FakeApi {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, status: DriveStatus) {
        push(&self.statuses, Duration::ZERO, Outcome::Reply(status));
    }

    pub fn push_status_after(&self, delay: Duration, status: DriveStatus) {
        push(&self.statuses, delay, Outcome::Reply(status));
    }

    pub fn push_status_failure(&self) {
        push(&self.statuses, Duration::ZERO, Outcome::Unavailable);
    }

    pub fn push_eject(&self, reply: ActionReply) {
        push(&self.ejects, Duration::ZERO, Outcome::Reply(reply));
    }

    pub fn push_unit(&self, unit: EnumerationUnit) {
        push(&self.units, Duration::ZERO, Outcome::Reply(unit));
    }

    pub fn push_unit_after(&self, delay: Duration, unit: EnumerationUnit) {
        push(&self.units, delay, Outcome::Reply(unit));
    }

    pub fn push_item(&self, filename: &str) {
        self.push_unit(EnumerationUnit::Item(ImageRef::new(filename)));
    }

    pub fn push_malformed_unit(&self) {
        push(&self.units, Duration::ZERO, Outcome::Malformed);
    }

    pub fn push_unit_failure(&self) {
        push(&self.units, Duration::ZERO, Outcome::Unavailable);
    }

    pub fn push_listing(&self, listing: CatalogListing) {
        push(&self.listings, Duration::ZERO, Outcome::Reply(listing));
    }

    pub fn push_mount(&self, reply: ActionReply) {
        push(&self.mounts, Duration::ZERO, Outcome::Reply(reply));
    }

    pub fn push_mount_failure(&self) {
        push(&self.mounts, Duration::ZERO, Outcome::Unavailable);
    }

    pub fn push_mount_hang(&self) {
        push(&self.mounts, Duration::ZERO, Outcome::Hang);
    }

    pub fn push_version(&self, info: VersionInfo) {
        push(&self.versions, Duration::ZERO, Outcome::Reply(info));
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn eject_calls(&self) -> usize {
        self.eject_calls.load(Ordering::SeqCst)
    }

    pub fn next_image_calls(&self) -> usize {
        self.next_image_calls.load(Ordering::SeqCst)
    }

    pub fn images_calls(&self) -> usize {
        self.images_calls.load(Ordering::SeqCst)
    }

    pub fn mounted(&self) -> Vec<String> {
        self.mounted.lock().unwrap().clone()
    }
}

impl ControlApi for FakeApi {
    fn status(&self) -> BoxFuture<'_, Result<DriveStatus, ApiError>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        answer(&self.statuses, "status")
    }

    fn eject(&self) -> BoxFuture<'_, Result<ActionReply, ApiError>> {
        self.eject_calls.fetch_add(1, Ordering::SeqCst);
        answer(&self.ejects, "eject")
    }

    fn next_image(&self) -> BoxFuture<'_, Result<EnumerationUnit, ApiError>> {
        self.next_image_calls.fetch_add(1, Ordering::SeqCst);
        answer(&self.units, "nextImage")
    }

    fn images(&self) -> BoxFuture<'_, Result<CatalogListing, ApiError>> {
        self.images_calls.fetch_add(1, Ordering::SeqCst);
        answer(&self.listings, "images")
    }

    fn mount<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<ActionReply, ApiError>> {
        self.mounted.lock().unwrap().push(filename.to_string());
        answer(&self.mounts, "image")
    }

    fn version(&self) -> BoxFuture<'_, Result<VersionInfo, ApiError>> {
        answer(&self.versions, "version")
    }
}

/// Scheduler wired to `api`, plus the completion receiver a test drains by hand.
pub(crate) fn scheduler_with(
    api: &Arc<FakeApi>,
) -> (Scheduler, tokio::sync::mpsc::UnboundedReceiver<Completion>) {
    Scheduler::new(api.clone())
}

pub(crate) fn primary(filename: &str) -> DriveStatus {
    DriveStatus {
        is_primary: true,
        image: Some(ImageRef::new(filename)),
    }
}

pub(crate) fn secondary_empty() -> DriveStatus {
    DriveStatus {
        is_primary: false,
        image: None,
    }
}
