//! AWS SDK implementation of the transport seam.
//!
//! Thin mapping from the trait operations onto the CloudWatch Logs, IAM, and
//! STS clients. All remote failures are classified here into
//! [`TransportError`]; nothing above this module sees SDK error types.

use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatchlogs::operation::create_log_stream::CreateLogStreamError;
use aws_sdk_cloudwatchlogs::operation::put_log_events::PutLogEventsError;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_iam::types::PolicyEvaluationDecisionType;
use async_trait::async_trait;
use tracing::debug;

use crate::buffer::EventBatch;
use crate::transport::{LogsTransport, PutOutcome, SequenceToken, TransportError};

/// Write actions the pipeline needs; the policy simulation checks exactly
/// these.
const WRITE_ACTIONS: [&str; 3] = [
    "logs:CreateLogStream",
    "logs:PutLogEvents",
    "logs:DescribeLogStreams",
];

pub struct CloudWatchTransport {
    logs: aws_sdk_cloudwatchlogs::Client,
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    region: Option<String>,
}

impl CloudWatchTransport {
    #[must_use]
    pub fn new(sdk_config: &SdkConfig) -> Self {
        CloudWatchTransport {
            logs: aws_sdk_cloudwatchlogs::Client::new(sdk_config),
            iam: aws_sdk_iam::Client::new(sdk_config),
            sts: aws_sdk_sts::Client::new(sdk_config),
            region: sdk_config.region().map(ToString::to_string),
        }
    }
}

#[async_trait]
impl LogsTransport for CloudWatchTransport {
    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), TransportError> {
        match self
            .logs
            .create_log_stream()
            .log_group_name(group)
            .log_stream_name(stream)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                if let SdkError::ServiceError(ctx) = &err {
                    if matches!(
                        ctx.err(),
                        CreateLogStreamError::ResourceAlreadyExistsException(_)
                    ) {
                        return Ok(());
                    }
                }
                Err(map_remote_error("create log stream", err))
            }
        }
    }

    async fn fetch_sequence_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<SequenceToken>, TransportError> {
        let out = self
            .logs
            .describe_log_streams()
            .log_group_name(group)
            .log_stream_name_prefix(stream)
            .limit(1)
            .send()
            .await
            .map_err(|err| map_remote_error("describe log streams", err))?;

        // The prefix query can match a sibling stream; only an exact name
        // match carries the token we want.
        Ok(out
            .log_streams()
            .iter()
            .find(|s| s.log_stream_name() == Some(stream))
            .and_then(|s| s.upload_sequence_token())
            .map(str::to_string))
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        token: Option<&str>,
        batch: &EventBatch,
    ) -> Result<PutOutcome, TransportError> {
        let events: Vec<InputLogEvent> = batch
            .events()
            .iter()
            .map(|event| {
                InputLogEvent::builder()
                    .timestamp(event.timestamp)
                    .message(event.message.clone())
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| TransportError::Malformed(format!("invalid log event: {err}")))?;

        let result = self
            .logs
            .put_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .set_log_events(Some(events))
            .set_sequence_token(token.map(str::to_string))
            .send()
            .await;

        match result {
            Ok(out) => {
                let rejected_events = out
                    .rejected_log_events_info()
                    .map_or(0, |info| rejected_count(batch.len(), info));
                Ok(PutOutcome {
                    next_token: out.next_sequence_token().map(str::to_string),
                    rejected_events,
                })
            }
            Err(err) => {
                if let SdkError::ServiceError(ctx) = &err {
                    match ctx.err() {
                        PutLogEventsError::InvalidSequenceTokenException(e) => {
                            return Err(TransportError::SequenceConflict {
                                expected: e.expected_sequence_token().map(str::to_string),
                            });
                        }
                        // The batch landed on an earlier attempt; count it as
                        // delivered and advance to the token the service
                        // reports.
                        PutLogEventsError::DataAlreadyAcceptedException(e) => {
                            debug!("batch already accepted by the service, advancing");
                            return Ok(PutOutcome {
                                next_token: e.expected_sequence_token().map(str::to_string),
                                rejected_events: 0,
                            });
                        }
                        _ => {}
                    }
                }
                Err(map_remote_error("put log events", err))
            }
        }
    }

    async fn probe_read(&self, group: &str, limit: i32) -> Result<(), TransportError> {
        self.logs
            .filter_log_events()
            .log_group_name(group)
            .limit(limit)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| map_remote_error("filter log events", err))
    }

    async fn simulate_write_policy(&self, group: &str) -> Result<Option<String>, TransportError> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| map_remote_error("get caller identity", err))?;
        let caller_arn = identity.arn().ok_or_else(|| {
            TransportError::Service("caller identity carries no principal ARN".to_string())
        })?;
        let account = identity.account().unwrap_or_default();
        let principal = principal_for_simulation(caller_arn);

        let region = self.region.as_deref().unwrap_or("*");
        let resource_arn = format!("arn:aws:logs:{region}:{account}:log-group:{group}:*");

        let mut request = self
            .iam
            .simulate_principal_policy()
            .policy_source_arn(&principal)
            .resource_arns(resource_arn);
        for action in WRITE_ACTIONS {
            request = request.action_names(action);
        }
        let response = request
            .send()
            .await
            .map_err(|err| map_remote_error("simulate principal policy", err))?;

        let denied: Vec<(String, String)> = response
            .evaluation_results()
            .iter()
            .filter(|result| result.eval_decision() != &PolicyEvaluationDecisionType::Allowed)
            .map(|result| {
                (
                    result.eval_action_name().to_string(),
                    result.eval_decision().as_str().to_string(),
                )
            })
            .collect();

        Ok(summarize_denials(&principal, &denied))
    }
}

/// Approximate count of events the service accepted the request with but
/// discarded for falling outside its time window.
fn rejected_count(
    batch_len: usize,
    info: &aws_sdk_cloudwatchlogs::types::RejectedLogEventsInfo,
) -> usize {
    let too_new = info
        .too_new_log_event_start_index()
        .and_then(|i| usize::try_from(i).ok())
        .map_or(0, |i| batch_len.saturating_sub(i));
    let too_old = info
        .too_old_log_event_end_index()
        .and_then(|i| usize::try_from(i + 1).ok())
        .unwrap_or(0);
    let expired = info
        .expired_log_event_end_index()
        .and_then(|i| usize::try_from(i + 1).ok())
        .unwrap_or(0);
    too_new + too_old.max(expired)
}

/// Classifies an SDK failure into the transport taxonomy.
///
/// Service errors are classified by their error code; everything else
/// (dispatch failures, timeouts, unparseable responses) is a connectivity
/// problem.
fn map_remote_error<E>(context: &str, err: SdkError<E>) -> TransportError
where
    E: ProvideErrorMetadata,
{
    match &err {
        SdkError::ServiceError(ctx) => {
            let service_err = ctx.err();
            let code = service_err.code().unwrap_or("Unknown");
            let message = service_err.message().unwrap_or(code);
            let detail = format!("{context}: {message}");
            match code {
                "ThrottlingException" | "Throttling" | "RequestLimitExceeded" => {
                    TransportError::Throttled(detail)
                }
                "AccessDeniedException"
                | "AccessDenied"
                | "UnrecognizedClientException"
                | "ExpiredTokenException"
                | "InvalidClientTokenId" => TransportError::Auth(detail),
                "ResourceNotFoundException" => TransportError::ResourceMissing(detail),
                "InvalidParameterException" => TransportError::Malformed(detail),
                _ => TransportError::Service(format!("{context}: {code}: {message}")),
            }
        }
        SdkError::TimeoutError(_) => {
            TransportError::Connectivity(format!("{context}: request timed out"))
        }
        SdkError::DispatchFailure(_) => {
            TransportError::Connectivity(format!("{context}: failed to dispatch request"))
        }
        SdkError::ResponseError(_) => {
            TransportError::Connectivity(format!("{context}: unreadable response"))
        }
        _ => TransportError::Connectivity(format!("{context}: transport failure")),
    }
}

/// Converts an assumed-role session ARN to the underlying role ARN.
///
/// The policy-simulation API rejects `sts:assumed-role` session ARNs; the
/// role itself carries the policies being simulated.
fn principal_for_simulation(arn: &str) -> String {
    if let Some(rest) = arn.strip_prefix("arn:aws:sts::") {
        if let Some((account, resource)) = rest.split_once(':') {
            if let Some(role_part) = resource.strip_prefix("assumed-role/") {
                let role = role_part.split('/').next().unwrap_or(role_part);
                return format!("arn:aws:iam::{account}:role/{role}");
            }
        }
    }
    arn.to_string()
}

fn summarize_denials(principal: &str, denied: &[(String, String)]) -> Option<String> {
    if denied.is_empty() {
        return None;
    }
    let actions = denied
        .iter()
        .map(|(action, decision)| format!("{action} ({decision})"))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "Policy simulation reported restrictions for {principal}: {actions}"
    ))
}
