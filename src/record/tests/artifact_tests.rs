//! Unit tests for artifact upload accounting and nonces.

use crate::record::domain::{
    Artifact, DownloadNonce, EventUuid, NewArtifact, RecordError, TaskUuid, UploadNonce,
    content_digest,
};
use camino::Utf8PathBuf;
use eyre::{bail, ensure};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

#[fixture]
fn artifact() -> Artifact {
    Artifact::new(
        NewArtifact {
            task_uuid: TaskUuid::new_for_event(&EventUuid::new()),
            name: "kiln.tar.xz".to_owned(),
            len: 10,
            path: Utf8PathBuf::from("kiln.tar.xz"),
        },
        &DefaultClock,
    )
}

#[rstest]
fn new_artifact_has_distinct_fresh_nonces(artifact: Artifact) {
    assert_ne!(artifact.upload_nonce().as_str(), artifact.download_nonce().as_str());
    assert_eq!(artifact.upload_nonce().as_str().len(), 32);
    assert!(artifact.is_in_flight());
    assert_eq!(artifact.resume_offset(), 0);
    let other = UploadNonce::generate();
    assert_ne!(&other, artifact.upload_nonce());
}

#[rstest]
fn nonces_do_not_leak_through_debug(artifact: Artifact) {
    let rendered = format!("{:?}", artifact.upload_nonce());
    assert!(!rendered.contains(artifact.upload_nonce().as_str()));
}

#[rstest]
fn in_order_chunks_complete_the_upload(artifact: Artifact) -> eyre::Result<()> {
    let mut upload = artifact;
    ensure!(!upload.accept_chunk(0, 4)?);
    ensure!(upload.resume_offset() == 4);
    ensure!(upload.accept_chunk(4, 6)?);
    ensure!(upload.is_complete());
    Ok(())
}

#[rstest]
fn out_of_order_chunk_is_rejected(artifact: Artifact) -> eyre::Result<()> {
    let mut upload = artifact;
    upload.accept_chunk(0, 4)?;
    match upload.accept_chunk(6, 2) {
        Err(RecordError::OffsetMismatch { expected, got }) => {
            ensure!(expected == 4 && got == 6);
        }
        other => bail!("expected OffsetMismatch, got {other:?}"),
    }
    ensure!(upload.resume_offset() == 4, "rejected chunk must not move the offset");
    Ok(())
}

#[rstest]
fn overrunning_chunk_is_rejected(artifact: Artifact) -> eyre::Result<()> {
    let mut upload = artifact;
    match upload.accept_chunk(0, 11) {
        Err(RecordError::Overrun { len, end }) => ensure!(len == 10 && end == 11),
        other => bail!("expected Overrun, got {other:?}"),
    }
    Ok(())
}

#[rstest]
#[case("0123456789abcdef0123456789abcdef", true)]
#[case("0123456789ABCDEF0123456789ABCDEF", true)]
#[case("0123", false)]
#[case("zz23456789abcdef0123456789abcdef", false)]
fn nonce_parsing_validates_shape(#[case] raw: &str, #[case] valid: bool) {
    assert_eq!(DownloadNonce::parse(raw).is_ok(), valid);
}

#[rstest]
fn digest_is_hex_sha256() {
    assert_eq!(
        content_digest(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
