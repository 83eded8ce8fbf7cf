//! Kafka store inputs

use super::{StoreOptions, diff_field, set_if_changed};
use crate::diff::DiffResponse;
use crate::error::{ProviderError, Result};
use crate::resource::CheckFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

const MSK_IAM: &str = "AWS_MSK_IAM";
const SCRAM_MODES: &[&str] = &["PLAIN", "SHA256", "SHA512"];

const URIS: &str = "uris";
const HASH_FUNCTION: &str = "kafka.sasl.hash_function";
const USERNAME: &str = "kafka.sasl.username";
const PASSWORD: &str = "kafka.sasl.password";
const MSK_ROLE_ARN: &str = "kafka.msk.iam_role_arn";
const MSK_REGION: &str = "kafka.msk.aws_region";
const SCHEMA_REGISTRY: &str = "kafka.schema_registry_name";
const TLS_DISABLED: &str = "tls.disabled";
const TLS_VERIFY_HOSTNAME: &str = "tls.verify_server_hostname";
const TLS_CA_CERT: &str = "tls.ca_cert";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaInputs {
    /// Comma-separated bootstrap brokers
    #[serde(default)]
    pub uris: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_registry_name: Option<String>,
    /// AWS_MSK_IAM, PLAIN, SHA256 or SHA512
    #[serde(default)]
    pub sasl_hash_function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msk_iam_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msk_aws_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_verify_server_hostname: Option<bool>,
    /// Local path of a PEM bundle sent inline as `tls.ca_cert`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert_file: Option<String>,
}

impl fmt::Debug for KafkaInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaInputs")
            .field("uris", &self.uris)
            .field("sasl_hash_function", &self.sasl_hash_function)
            .field("sasl_username", &self.sasl_username.as_ref().map(|_| "<redacted>"))
            .field("sasl_password", &self.sasl_password.as_ref().map(|_| "<redacted>"))
            .field("msk_iam_role_arn", &self.msk_iam_role_arn)
            .field("tls_disabled", &self.tls_disabled)
            .finish_non_exhaustive()
    }
}

impl KafkaInputs {
    fn is_msk_iam(&self) -> bool {
        self.sasl_hash_function.eq_ignore_ascii_case(MSK_IAM)
    }

    fn is_scram(&self) -> bool {
        SCRAM_MODES
            .iter()
            .any(|m| self.sasl_hash_function.eq_ignore_ascii_case(m))
    }

    fn tls_off(&self) -> bool {
        self.tls_disabled == Some(true)
    }

    pub(super) fn validate(&self) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        let missing = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

        if self.sasl_hash_function.trim().is_empty() {
            failures.push(CheckFailure::new(
                "kafka.saslHashFunction",
                "saslHashFunction is required",
            ));
        }
        if self.uris.trim().is_empty() {
            failures.push(CheckFailure::new("kafka.uris", "uris is required"));
        }

        if self.is_msk_iam() {
            if missing(&self.msk_iam_role_arn) {
                failures.push(CheckFailure::new(
                    "kafka.mskIamRoleArn",
                    "mskIamRoleArn is required for AWS_MSK_IAM",
                ));
            }
            if missing(&self.msk_aws_region) {
                failures.push(CheckFailure::new(
                    "kafka.mskAwsRegion",
                    "mskAwsRegion is required for AWS_MSK_IAM",
                ));
            }
            if self.sasl_username.is_some() || self.sasl_password.is_some() {
                failures.push(CheckFailure::new(
                    "kafka.saslUsername",
                    "saslUsername and saslPassword are not allowed with AWS_MSK_IAM",
                ));
            }
        } else if self.is_scram() {
            if missing(&self.sasl_username) {
                failures.push(CheckFailure::new(
                    "kafka.saslUsername",
                    "saslUsername is required for SCRAM mode",
                ));
            }
            if missing(&self.sasl_password) {
                failures.push(CheckFailure::new(
                    "kafka.saslPassword",
                    "saslPassword is required for SCRAM mode",
                ));
            }
        }
        failures
    }

    pub(super) fn diff(&self, new: &Self, diff: &mut DiffResponse) {
        diff_field(diff, "kafka", "uris", &self.uris, &new.uris);
        diff_field(diff, "kafka", "schemaRegistryName", &self.schema_registry_name, &new.schema_registry_name);
        diff_field(diff, "kafka", "saslHashFunction", &self.sasl_hash_function, &new.sasl_hash_function);
        diff_field(diff, "kafka", "saslUsername", &self.sasl_username, &new.sasl_username);
        diff_field(diff, "kafka", "saslPassword", &self.sasl_password, &new.sasl_password);
        diff_field(diff, "kafka", "mskIamRoleArn", &self.msk_iam_role_arn, &new.msk_iam_role_arn);
        diff_field(diff, "kafka", "mskAwsRegion", &self.msk_aws_region, &new.msk_aws_region);
        diff_field(diff, "kafka", "tlsDisabled", &self.tls_disabled, &new.tls_disabled);
        diff_field(
            diff,
            "kafka",
            "tlsVerifyServerHostname",
            &self.tls_verify_server_hostname,
            &new.tls_verify_server_hostname,
        );
        diff_field(diff, "kafka", "tlsCaCertFile", &self.tls_ca_cert_file, &new.tls_ca_cert_file);
    }

    pub(super) async fn create_options(&self) -> Result<StoreOptions> {
        let mut out = StoreOptions::default();
        let opts = &mut out.options;
        opts.raw("type", "KAFKA")
            .string(URIS, &self.uris)
            .raw(HASH_FUNCTION, self.sasl_hash_function.as_str());

        if let Some(disabled) = self.tls_disabled {
            opts.boolean(TLS_DISABLED, disabled);
        }
        if self.tls_off() {
            opts.boolean(TLS_VERIFY_HOSTNAME, false);
        } else if let Some(verify) = self.tls_verify_server_hostname {
            opts.boolean(TLS_VERIFY_HOSTNAME, verify);
        }

        if self.is_msk_iam() {
            if let Some(arn) = &self.msk_iam_role_arn {
                opts.string(MSK_ROLE_ARN, arn);
            }
            if let Some(region) = &self.msk_aws_region {
                opts.string(MSK_REGION, region);
            }
        } else {
            if let Some(username) = &self.sasl_username {
                opts.string(USERNAME, username);
            }
            if let Some(password) = &self.sasl_password {
                opts.string(PASSWORD, password);
            }
        }

        if let Some(registry) = &self.schema_registry_name {
            opts.string(SCHEMA_REGISTRY, registry);
        }
        if let (Some(path), false) = (&self.tls_ca_cert_file, self.tls_off()) {
            let pem = read_ca_cert(path).await?;
            opts.string(TLS_CA_CERT, &pem);
        }
        Ok(out)
    }

    /// Options for `UPDATE STORE`, covering only what changed. Switching
    /// between MSK IAM and SASL clears the credentials of the old mode.
    pub(super) async fn update_options(&self, new: &Self) -> Result<StoreOptions> {
        let mut out = StoreOptions::default();
        let opts = &mut out.options;

        if self.uris != new.uris {
            opts.string(URIS, &new.uris);
        }
        if self.sasl_hash_function != new.sasl_hash_function {
            opts.string(HASH_FUNCTION, &new.sasl_hash_function);
        }

        if new.is_msk_iam() {
            if !self.is_msk_iam() {
                if self.sasl_username.is_some() {
                    opts.null(USERNAME);
                }
                if self.sasl_password.is_some() {
                    opts.null(PASSWORD);
                }
            }
            set_if_changed(opts, MSK_ROLE_ARN, self.msk_iam_role_arn.as_deref(), new.msk_iam_role_arn.as_deref());
            set_if_changed(opts, MSK_REGION, self.msk_aws_region.as_deref(), new.msk_aws_region.as_deref());
        } else {
            if self.is_msk_iam() {
                if self.msk_iam_role_arn.is_some() {
                    opts.null(MSK_ROLE_ARN);
                }
                if self.msk_aws_region.is_some() {
                    opts.null(MSK_REGION);
                }
            }
            set_if_changed(opts, USERNAME, self.sasl_username.as_deref(), new.sasl_username.as_deref());
            set_if_changed(opts, PASSWORD, self.sasl_password.as_deref(), new.sasl_password.as_deref());
        }

        set_if_changed(
            opts,
            SCHEMA_REGISTRY,
            self.schema_registry_name.as_deref(),
            new.schema_registry_name.as_deref(),
        );

        if self.tls_disabled != new.tls_disabled {
            match new.tls_disabled {
                Some(disabled) => opts.boolean(TLS_DISABLED, disabled),
                None => opts.null(TLS_DISABLED),
            };
        }
        if self.tls_verify_server_hostname != new.tls_verify_server_hostname {
            match new.tls_verify_server_hostname {
                None => {
                    opts.null(TLS_VERIFY_HOSTNAME);
                }
                Some(verify) if !new.tls_off() => {
                    opts.boolean(TLS_VERIFY_HOSTNAME, verify);
                }
                Some(_) => {}
            }
        }
        if self.tls_ca_cert_file != new.tls_ca_cert_file {
            match &new.tls_ca_cert_file {
                None => {
                    opts.null(TLS_CA_CERT);
                }
                Some(path) if !new.tls_off() => {
                    let pem = read_ca_cert(path).await?;
                    opts.string(TLS_CA_CERT, &pem);
                }
                Some(_) => {}
            }
        }
        Ok(out)
    }
}

async fn read_ca_cert(path: &str) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        ProviderError::invalid_input(format!("failed to read tlsCaCertFile {path}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sasl() -> KafkaInputs {
        KafkaInputs {
            uris: "b-1.example.com:9096".into(),
            schema_registry_name: None,
            sasl_hash_function: "SHA512".into(),
            sasl_username: Some("svc".into()),
            sasl_password: Some("hunter2".into()),
            msk_iam_role_arn: None,
            msk_aws_region: None,
            tls_disabled: None,
            tls_verify_server_hostname: None,
            tls_ca_cert_file: None,
        }
    }

    fn msk() -> KafkaInputs {
        KafkaInputs {
            sasl_hash_function: "aws_msk_iam".into(),
            sasl_username: None,
            sasl_password: None,
            msk_iam_role_arn: Some("arn:aws:iam::123456789012:role/msk".into()),
            msk_aws_region: Some("us-east-1".into()),
            ..sasl()
        }
    }

    fn properties(failures: &[CheckFailure]) -> Vec<&str> {
        failures.iter().map(|f| f.property.as_str()).collect()
    }

    #[test]
    fn test_validate_auth_modes() {
        assert!(sasl().validate().is_empty());
        assert!(msk().validate().is_empty());

        let mut missing_password = sasl();
        missing_password.sasl_password = None;
        assert_eq!(properties(&missing_password.validate()), vec!["kafka.saslPassword"]);

        let mut msk_with_user = msk();
        msk_with_user.sasl_username = Some("svc".into());
        msk_with_user.msk_aws_region = None;
        assert_eq!(
            properties(&msk_with_user.validate()),
            vec!["kafka.mskAwsRegion", "kafka.saslUsername"]
        );

        let empty = KafkaInputs {
            uris: String::new(),
            sasl_hash_function: String::new(),
            ..sasl()
        };
        assert_eq!(
            properties(&empty.validate()),
            vec!["kafka.saslHashFunction", "kafka.uris"]
        );
    }

    #[tokio::test]
    async fn test_create_options() {
        let mut inputs = sasl();
        inputs.tls_disabled = Some(true);
        inputs.tls_verify_server_hostname = Some(true);
        inputs.schema_registry_name = Some("registry".into());
        let out = inputs.create_options().await.unwrap();
        let opts = &out.options;
        assert_eq!(opts.get("type"), Some("KAFKA"));
        assert_eq!(opts.get(HASH_FUNCTION), Some("SHA512"));
        assert_eq!(opts.get(URIS), Some("'b-1.example.com:9096'"));
        assert_eq!(opts.get(TLS_DISABLED), Some("TRUE"));
        assert_eq!(opts.get(TLS_VERIFY_HOSTNAME), Some("FALSE"));
        assert_eq!(opts.get(USERNAME), Some("'svc'"));
        assert_eq!(opts.get("kafka.schema_registry_name"), Some("'registry'"));
        assert_eq!(opts.get(MSK_ROLE_ARN), None);

        let out = msk().create_options().await.unwrap();
        assert_eq!(out.options.get(MSK_REGION), Some("'us-east-1'"));
        assert_eq!(out.options.get(USERNAME), None);
    }

    #[tokio::test]
    async fn test_create_options_reads_ca_cert() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n").unwrap();
        let mut inputs = sasl();
        inputs.tls_ca_cert_file = Some(file.path().display().to_string());
        let out = inputs.create_options().await.unwrap();
        assert!(out.options.get(TLS_CA_CERT).unwrap().contains("BEGIN CERTIFICATE"));

        inputs.tls_ca_cert_file = Some("/nonexistent/ca.pem".into());
        assert!(inputs.create_options().await.is_err());
    }

    #[tokio::test]
    async fn test_update_switches_auth_mode() {
        let out = sasl().update_options(&msk()).await.unwrap();
        let opts = &out.options;
        assert_eq!(opts.get(USERNAME), Some("NULL"));
        assert_eq!(opts.get(PASSWORD), Some("NULL"));
        assert_eq!(opts.get(HASH_FUNCTION), Some("'aws_msk_iam'"));
        assert_eq!(opts.get(MSK_ROLE_ARN), Some("'arn:aws:iam::123456789012:role/msk'"));

        let back = msk().update_options(&sasl()).await.unwrap();
        assert_eq!(back.options.get(MSK_ROLE_ARN), Some("NULL"));
        assert_eq!(back.options.get(MSK_REGION), Some("NULL"));
        assert_eq!(back.options.get(USERNAME), Some("'svc'"));
    }

    #[tokio::test]
    async fn test_update_without_changes_is_empty() {
        let out = sasl().update_options(&sasl()).await.unwrap();
        assert!(out.options.is_empty());

        let mut rotated = sasl();
        rotated.sasl_password = Some("rotated".into());
        let out = sasl().update_options(&rotated).await.unwrap();
        assert_eq!(out.options.render(), "'kafka.sasl.password' = 'rotated'");

        let mut registry = sasl();
        registry.schema_registry_name = Some("registry".into());
        let out = sasl().update_options(&registry).await.unwrap();
        assert_eq!(out.options.render(), "'kafka.schema_registry_name' = 'registry'");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", sasl());
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"svc\""));
    }
}
