use super::test_helpers::*;
use super::*;
use crate::db::{JobFilter, JobStore, NewJob};
use crate::error::{JobError, ProviderError};
use crate::provider::PollStatus;
use crate::types::{Event, JobId, JobKind, JobRequest, JobStatus, Outcome};
use std::sync::Arc;
use std::time::Duration;

mod finalize;
