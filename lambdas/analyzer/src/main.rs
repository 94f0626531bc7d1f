use aws_config::BehaviorVersion;
use aws_lambda_events::event::s3::S3Event;
use domain::{
    extraction::{mime_type_from_file_name, normalize_mime_type, PrescriptionImage},
    workflow::{services, validate_run_id, Failure, Workflow, WorkflowInput},
    Config,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);

    let store = services::init_store(&config, Some(s3_client.clone()))?;
    let workflow = services::init(&config, store)?;

    lambda_runtime::run(service_fn(|event: LambdaEvent<S3Event>| async {
        handle_s3_event(event.payload, &workflow, &s3_client).await
    }))
    .await
}

/// Uploaded prescription waiting to be analyzed
#[derive(Debug, PartialEq)]
struct Upload {
    bucket: String,
    key: String,
    run_id: String,
}

/// Objects under `prescriptions/<run_id>/`; anything else is skipped
fn uploads(event: &S3Event) -> Vec<Upload> {
    let mut uploads = Vec::new();

    for record in &event.records {
        let (Some(bucket), Some(key)) = (&record.s3.bucket.name, &record.s3.object.key) else {
            tracing::warn!("S3 record without bucket or key");
            continue;
        };

        match run_id_from_key(key) {
            Some(run_id) => uploads.push(Upload {
                bucket: bucket.clone(),
                key: key.clone(),
                run_id: run_id.to_string(),
            }),
            None => tracing::warn!(key = %key, "Skipping object outside prescriptions/<run_id>/"),
        }
    }
    uploads
}

fn run_id_from_key(key: &str) -> Option<&str> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("prescriptions"), Some(run_id), Some(file), None)
            if !file.is_empty() && validate_run_id(run_id).is_ok() =>
        {
            Some(run_id)
        }
        _ => None,
    }
}

/// Stored content type first, then the key's extension
fn mime_type_for(content_type: Option<&str>, key: &str) -> &'static str {
    content_type
        .and_then(normalize_mime_type)
        .or_else(|| mime_type_from_file_name(key))
        .unwrap_or("application/octet-stream")
}

async fn handle_s3_event(
    event: S3Event,
    workflow: &Workflow,
    s3_client: &aws_sdk_s3::Client,
) -> Result<(), Error> {
    tracing::info!(records = event.records.len(), "Processing S3 records");

    let uploads = uploads(&event);
    let mut failed = Vec::new();

    for upload in &uploads {
        tracing::info!(
            run_id = %upload.run_id,
            "New prescription uploaded: s3://{}/{}",
            upload.bucket,
            upload.key
        );

        match analyze(upload, workflow, s3_client).await {
            Ok(location) => {
                tracing::info!(run_id = %upload.run_id, location = %location, "Prescription analyzed")
            }
            Err(e) => {
                tracing::error!(run_id = %upload.run_id, error = %e, "Failed to analyze prescription");
                failed.push(upload.run_id.clone());
            }
        }
    }

    if !failed.is_empty() {
        return Err(format!(
            "{} of {} prescriptions failed: {}",
            failed.len(),
            uploads.len(),
            failed.join(", ")
        )
        .into());
    }
    Ok(())
}

async fn analyze(
    upload: &Upload,
    workflow: &Workflow,
    s3_client: &aws_sdk_s3::Client,
) -> Result<String, Error> {
    let (data, content_type) = download_from_s3(s3_client, &upload.bucket, &upload.key).await?;
    let mime_type = mime_type_for(content_type.as_deref(), &upload.key);

    let image = PrescriptionImage::new(data, mime_type)
        .map_err(|e| Failure::from_error(&upload.run_id, &e))?;

    let report = workflow
        .execute(upload.run_id.as_str(), WorkflowInput::Image(Some(image)))
        .await?;

    Ok(report.location)
}

async fn download_from_s3(
    s3_client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<(Vec<u8>, Option<String>), Error> {
    let response = s3_client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await?;

    let content_type = response.content_type().map(str::to_string);
    let data = response.body.collect().await?;
    Ok((data.to_vec(), content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::workflow::new_run_id;

    fn event(keys: &[&str]) -> S3Event {
        let records: Vec<serde_json::Value> = keys
            .iter()
            .map(|key| {
                serde_json::json!({
                    "eventVersion": "2.1",
                    "eventSource": "aws:s3",
                    "awsRegion": "eu-west-1",
                    "eventTime": "2024-05-01T10:00:00.000Z",
                    "eventName": "ObjectCreated:Put",
                    "userIdentity": { "principalId": "EXAMPLE" },
                    "requestParameters": { "sourceIPAddress": "127.0.0.1" },
                    "responseElements": {
                        "x-amz-request-id": "EXAMPLE123456789",
                        "x-amz-id-2": "EXAMPLE123/abcdefghijklmn"
                    },
                    "s3": {
                        "s3SchemaVersion": "1.0",
                        "configurationId": "prescription-uploaded",
                        "bucket": {
                            "name": "prescriptions-bucket",
                            "ownerIdentity": { "principalId": "EXAMPLE" },
                            "arn": "arn:aws:s3:::prescriptions-bucket"
                        },
                        "object": {
                            "key": key,
                            "size": 1024,
                            "eTag": "0123456789abcdef0123456789abcdef",
                            "sequencer": "0A1B2C3D4E5F678901"
                        }
                    }
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({ "Records": records })).unwrap()
    }

    #[test]
    fn run_id_comes_from_the_key() {
        let run_id = new_run_id();
        let key = format!("prescriptions/{}/prescription", run_id);
        assert_eq!(run_id_from_key(&key), Some(run_id.as_str()));
    }

    #[test]
    fn foreign_keys_are_skipped() {
        let run_id = new_run_id();
        assert_eq!(run_id_from_key("reports/x/Links.md"), None);
        assert_eq!(run_id_from_key("prescriptions/not-a-ulid/prescription"), None);
        assert_eq!(run_id_from_key(&format!("prescriptions/{}/", run_id)), None);
        assert_eq!(run_id_from_key(&format!("prescriptions/{}/a/b", run_id)), None);
    }

    #[test]
    fn only_prescription_uploads_are_analyzed() {
        let run_id = new_run_id();
        let key = format!("prescriptions/{}/prescription", run_id);

        let uploads = uploads(&event(&[&key, "reports/other/Links.md"]));

        assert_eq!(
            uploads,
            vec![Upload {
                bucket: "prescriptions-bucket".to_string(),
                key,
                run_id,
            }]
        );
    }

    #[test]
    fn stored_content_type_wins_over_extension() {
        assert_eq!(mime_type_for(Some("image/png"), "prescriptions/x/rx.jpg"), "image/png");
        assert_eq!(mime_type_for(None, "prescriptions/x/rx.JPG"), "image/jpeg");
        assert_eq!(mime_type_for(Some("binary/octet-stream"), "prescriptions/x/rx.png"), "image/png");
        assert_eq!(mime_type_for(None, "prescriptions/x/prescription"), "application/octet-stream");
    }
}
