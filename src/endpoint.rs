use http::Uri;

use crate::config::ClientConfig;
use crate::context::RequestMessage;
use crate::error::SdkError;

/// Authentication scheme suggested by endpoint resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthSchemeHint {
    SigV4 {
        signing_name: String,
        signing_region: String,
    },
    Bearer,
    Anonymous,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: Uri,
    pub auth_schemes: Vec<AuthSchemeHint>,
}

pub trait EndpointResolver: Send + Sync {
    fn resolve(
        &self,
        config: &ClientConfig,
        request: &RequestMessage,
    ) -> Result<ResolvedEndpoint, SdkError>;
}

/// `{scheme}://{service}[-fips].{region}.{suffix}`, or the configured
/// service url when one is set.
#[derive(Debug, Default)]
pub struct RegionalEndpointResolver;

impl EndpointResolver for RegionalEndpointResolver {
    fn resolve(
        &self,
        config: &ClientConfig,
        _request: &RequestMessage,
    ) -> Result<ResolvedEndpoint, SdkError> {
        let url_text = match config.service_url() {
            Some(service_url) => service_url.trim_end_matches('/').to_owned(),
            None => {
                let region = config
                    .region()
                    .filter(|region| !region.trim().is_empty())
                    .ok_or_else(|| SdkError::EndpointResolution {
                        message: "no region configured".to_owned(),
                    })?;
                let host_prefix = if config.use_fips() {
                    format!("{}-fips", config.service_name())
                } else {
                    config.service_name().to_owned()
                };
                let suffix = if config.use_dual_stack() {
                    format!("{region}.api.{}", config.dns_suffix())
                } else {
                    format!("{region}.{}", config.dns_suffix())
                };
                format!("{}://{host_prefix}.{suffix}", config.scheme())
            }
        };
        let url = url_text
            .parse::<Uri>()
            .map_err(|_| SdkError::InvalidUri { uri: url_text })?;

        let signing_region = config.region().unwrap_or("us-east-1").to_owned();
        Ok(ResolvedEndpoint {
            url,
            auth_schemes: vec![AuthSchemeHint::SigV4 {
                signing_name: config.authentication_service_name().to_owned(),
                signing_region,
            }],
        })
    }
}

/// Replaces `{name}` and greedy `{name+}` segments in a resource path.
pub(crate) fn substitute_path_resources(
    resource_path: &str,
    request: &RequestMessage,
) -> Result<String, SdkError> {
    let mut resolved = resource_path.to_owned();
    for (name, value) in &request.path_resources {
        let greedy = format!("{{{name}+}}");
        let plain = format!("{{{name}}}");
        if resolved.contains(&greedy) {
            let encoded = value
                .split('/')
                .map(|segment| encode_path_segment(segment))
                .collect::<Vec<_>>()
                .join("/");
            resolved = resolved.replace(&greedy, &encoded);
        } else {
            resolved = resolved.replace(&plain, &encode_path_segment(value));
        }
    }
    if let Some(start) = resolved.find('{')
        && resolved[start..].contains('}')
    {
        return Err(SdkError::Marshal {
            message: format!("unresolved path resource in {resolved}"),
            source: None,
        });
    }
    Ok(resolved)
}

fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
