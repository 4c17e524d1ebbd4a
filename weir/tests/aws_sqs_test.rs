//! Exercises `send_aws_sqs`'s real (non-fake) client path against a
//! LocalStack SQS queue, modeled on the teacher's own localstack-backed
//! AWS integration test.
#![cfg(feature = "aws")]

use aws_sdk_sqs as sqs;
use aws_sdk_sqs::config::{BehaviorVersion, Region};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers_modules::localstack::LocalStack;
use weir::runtime::{Context, Pipeline};
use weir::Message;

#[tokio::test]
async fn weir_aws_sqs_test() {
    let request = LocalStack::default().with_env_var("SERVICES", "sqs");
    let container = request.start().await.unwrap();

    let host_ip = container.get_host().await.unwrap();
    let host_port = container.get_host_port_ipv4(4566).await.unwrap();
    let endpoint_url = format!("http://{host_ip}:{host_port}");

    std::env::set_var("AWS_ACCESS_KEY_ID", "fake");
    std::env::set_var("AWS_SECRET_ACCESS_KEY", "fake");
    std::env::set_var("AWS_DEFAULT_REGION", "us-east-1");

    let creds = sqs::config::Credentials::new("fake", "fake", None, None, "test");
    let config = sqs::config::Builder::default()
        .behavior_version(BehaviorVersion::v2025_01_17())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(&endpoint_url)
        .build();
    let client = sqs::Client::from_conf(config);

    let queue = client.create_queue().queue_name("weir-out").send().await.unwrap();
    let queue_url = queue.queue_url().unwrap();
    let account = queue_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split('/')
        .nth(1)
        .unwrap();
    let arn = format!("arn:aws:sqs:us-east-1:{account}:weir-out");

    let yaml = format!(
        "
transforms:
  - type: send_aws_sqs
    settings:
      aws:
        arn: \"{arn}\"
        endpoint_url: \"{endpoint_url}\"
"
    );

    let pipeline = Pipeline::from_config(&yaml).await.unwrap();
    let ctx = Context::new();

    pipeline
        .process(&ctx, Message::Data(b"Testing Message to send to SQS".to_vec()))
        .await
        .unwrap();
    pipeline.process(&ctx, Message::control()).await.unwrap();

    let result = client.receive_message().queue_url(queue_url).send().await.unwrap();
    let messages = result.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body().unwrap(), "Testing Message to send to SQS");
}
