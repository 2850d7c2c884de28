//! Classification of failed chain reads and writes into actionable categories.

use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    IndexingDelay,
    UnderpricedGas,
    InsufficientBalance,
    WrongNetwork,
    Generic,
}

impl ErrorCategory {
    pub fn title(&self) -> &'static str {
        match self {
            Self::IndexingDelay => "Hedera RPC Indexing Delay",
            Self::UnderpricedGas => "Gas Price Too Low",
            Self::InsufficientBalance => "Insufficient HBAR",
            Self::WrongNetwork => "Network Configuration",
            Self::Generic => "Contract Error",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::IndexingDelay => {
                "Try using wallet connection instead of RPC, or wait for indexing to complete."
            }
            Self::UnderpricedGas => "Increase gas price to at least 350 gwei.",
            Self::InsufficientBalance => "Add HBAR to your wallet from the Hedera faucet.",
            Self::WrongNetwork => "Switch to Hedera Testnet (Chain ID: 296) in your wallet.",
            Self::Generic => {
                "Check your connection and try again, or try using wallet connection."
            }
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            Self::IndexingDelay | Self::UnderpricedGas | Self::Generic
        )
    }

    /// Advisory delay before a caller-driven retry. `None` when not retryable.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::IndexingDelay => Some(Duration::from_secs(30)),
            Self::UnderpricedGas => Some(Duration::from_secs(5)),
            Self::Generic => Some(Duration::from_secs(10)),
            Self::InsufficientBalance | Self::WrongNetwork => None,
        }
    }

    pub fn alternative_approach(&self) -> Option<&'static str> {
        match self {
            Self::IndexingDelay => Some("Use wallet connection or Mirror Node API"),
            Self::Generic => Some("Try wallet connection instead of RPC"),
            _ => None,
        }
    }
}

/// A classified failure, ready to hand to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    #[serde(rename = "type")]
    pub title: &'static str,
    pub message: String,
    pub suggestion: &'static str,
    pub should_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_approach: Option<&'static str>,
}

/// Map an error message to exactly one category. First matching rule wins.
pub fn classify(message: &str) -> ErrorCategory {
    if message.contains("call revert exception") && message.contains("data=\"0x\"") {
        ErrorCategory::IndexingDelay
    } else if message.contains("transaction underpriced") {
        ErrorCategory::UnderpricedGas
    } else if message.contains("insufficient funds") {
        ErrorCategory::InsufficientBalance
    } else if message.contains("network not supported") || message.contains("chain") {
        ErrorCategory::WrongNetwork
    } else {
        ErrorCategory::Generic
    }
}

/// Classify and attach the human-facing fields.
pub fn describe(message: &str) -> ClassifiedError {
    let category = classify(message);
    let message = match category {
        ErrorCategory::IndexingDelay => {
            "Hedera RPC indexing delay detected. The contract exists but RPC is slow to respond."
                .to_string()
        }
        ErrorCategory::UnderpricedGas => {
            "Transaction gas price is below Hedera minimum (350 gwei).".to_string()
        }
        ErrorCategory::InsufficientBalance => {
            "Insufficient HBAR balance for transaction fees.".to_string()
        }
        ErrorCategory::WrongNetwork => "Wallet not connected to Hedera Testnet.".to_string(),
        ErrorCategory::Generic => message.to_string(),
    };
    ClassifiedError {
        category,
        title: category.title(),
        message,
        suggestion: category.suggestion(),
        should_retry: category.should_retry(),
        retry_delay_ms: category.retry_delay().map(|d| d.as_millis() as u64),
        alternative_approach: category.alternative_approach(),
    }
}
