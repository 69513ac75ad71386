//! Wire shape of coordination envelopes and slot accounting.

use crate::config::PlatformLimit;
use crate::coordination::domain::{
    CancelTask, Envelope, LeaseOutcome, LeaseRequest, LeaseResponse, LogAppend, PlatformSlots,
    Rejection, SlotClaim, SlotUsage,
};
use crate::record::domain::{EventUuid, FinishStatus, LogChannel, TaskUuid};
use eyre::{Result, ensure};
use rstest::rstest;
use serde_json::{Value, json};

fn task_uuid() -> TaskUuid {
    TaskUuid::new_for_event(&EventUuid::new())
}

#[rstest]
fn lease_request_uses_camel_case_fields() -> Result<()> {
    let envelope = Envelope::LeaseRequest(LeaseRequest {
        resource_name: "device-A".to_owned(),
        cookie: "abc".to_owned(),
        amount: 1,
        lease_seconds: 30,
    });
    let value: Value = serde_json::from_slice(&envelope.to_json()?)?;
    ensure!(
        value
            == json!({
                "schema": "kiln.resource.request",
                "resourceName": "device-A",
                "cookie": "abc",
                "amount": 1,
                "leaseSeconds": 30,
            }),
        "unexpected wire form: {value}"
    );
    Ok(())
}

#[rstest]
fn rejection_carries_counters() -> Result<()> {
    let uuid = task_uuid();
    let envelope = Envelope::Rejection(Rejection {
        platform: "linux-riscv64".to_owned(),
        task_uuid: uuid.clone(),
        ongoing: 2,
        limit: 2,
    });
    let value: Value = serde_json::from_slice(&envelope.to_json()?)?;
    ensure!(value["schema"] == "kiln.task.reject");
    ensure!(value["task_uuid"] == uuid.as_str());
    ensure!(value["ongoing"] == 2 && value["limit"] == 2);
    ensure!(Envelope::from_json(&envelope.to_json()?)? == envelope);
    Ok(())
}

#[rstest]
fn log_payload_travels_as_hex() -> Result<()> {
    let envelope = Envelope::Log(LogAppend {
        task_uuid: task_uuid(),
        channel: LogChannel::new(1),
        timestamp_us: 5,
        finished: FinishStatus::exited(0),
        payload: b"ok\n".to_vec(),
    });
    let value: Value = serde_json::from_slice(&envelope.to_json()?)?;
    ensure!(value["payload"] == "6f6b0a");
    ensure!(value["finished"] == 0x4000);
    Ok(())
}

#[rstest]
#[case(br#"{"schema":"kiln.unknown"}"#.as_slice())]
#[case(br#"{"task_uuid":"00"}"#.as_slice())]
#[case(b"not json".as_slice())]
fn malformed_messages_are_rejected(#[case] bytes: &[u8]) {
    assert!(Envelope::from_json(bytes).is_err());
}

#[rstest]
fn cancel_schema_tag() {
    let envelope = Envelope::Cancel(CancelTask {
        task_uuid: task_uuid(),
    });
    assert_eq!(envelope.schema(), "kiln.task.cancel");
}

#[rstest]
#[case(LeaseResponse { cookie: "c".to_owned(), amount: 1, result: 0, error: None }, LeaseOutcome::Granted)]
#[case(
    LeaseResponse { cookie: "c".to_owned(), amount: 1, result: 1, error: Some("unknown resource".to_owned()) },
    LeaseOutcome::Denied("unknown resource".to_owned())
)]
#[case(
    LeaseResponse { cookie: "c".to_owned(), amount: 1, result: 7, error: None },
    LeaseOutcome::Denied("denied with result 7".to_owned())
)]
fn response_outcomes(#[case] response: LeaseResponse, #[case] expected: LeaseOutcome) {
    assert_eq!(response.outcome(), expected);
}

#[rstest]
fn slots_saturate_at_limit_and_never_underflow() {
    let mut slots = PlatformSlots::from_limits(&[PlatformLimit {
        name: "linux-x86_64".to_owned(),
        instances: 2,
    }]);

    assert_eq!(
        slots.claim("linux-x86_64"),
        SlotClaim::Claimed(SlotUsage { ongoing: 1, limit: 2 })
    );
    assert_eq!(
        slots.claim("linux-x86_64"),
        SlotClaim::Claimed(SlotUsage { ongoing: 2, limit: 2 })
    );
    assert_eq!(
        slots.claim("linux-x86_64"),
        SlotClaim::Saturated(SlotUsage { ongoing: 2, limit: 2 })
    );

    slots.release("linux-x86_64");
    slots.release("linux-x86_64");
    assert_eq!(
        slots.release("linux-x86_64"),
        Some(SlotUsage { ongoing: 0, limit: 2 })
    );
}

#[rstest]
fn unserved_platform_is_saturated_at_zero() {
    let mut slots = PlatformSlots::default();
    assert_eq!(
        slots.claim("windows-arm64"),
        SlotClaim::Saturated(SlotUsage::default())
    );
    assert_eq!(slots.release("windows-arm64"), None);
}
