//! Rule requests and execution results
//!
//! A `Rule` is a transient request: nothing is stored here, the packet filter
//! itself is the system of record. This module only knows how to turn a rule
//! into iptables arguments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Packet filter chain
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Input,
    Output,
    Forward,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Input => "INPUT",
            Chain::Output => "OUTPUT",
            Chain::Forward => "FORWARD",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict applied to a matching packet
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Accept,
    Drop,
    Reject,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Accept => "ACCEPT",
            Action::Drop => "DROP",
            Action::Reject => "REJECT",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }
}

/// A rule request as received on `/rules/add` and `/rules/delete`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Rule {
    pub chain: Chain,
    pub action: Action,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub destination_ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl Rule {
    pub fn new(chain: Chain, action: Action) -> Self {
        Self {
            chain,
            action,
            protocol: None,
            source_ip: None,
            destination_ip: None,
            port: None,
        }
    }

    /// Match arguments shared by append and delete.
    ///
    /// Empty addresses and port 0 count as unset. `--dport` is only emitted
    /// when a protocol is present; a bare port is dropped silently.
    pub fn filter_args(&self) -> Vec<String> {
        let mut args = vec![
            self.chain.as_str().to_string(),
            "-j".to_string(),
            self.action.as_str().to_string(),
        ];

        if let Some(proto) = self.protocol {
            args.push("-p".to_string());
            args.push(proto.as_str().to_string());
        }

        if let Some(src) = non_empty(&self.source_ip) {
            args.push("-s".to_string());
            args.push(src.to_string());
        }

        if let Some(dst) = non_empty(&self.destination_ip) {
            args.push("-d".to_string());
            args.push(dst.to_string());
        }

        if let (Some(port), Some(_)) = (self.port.filter(|p| *p != 0), self.protocol) {
            args.push("--dport".to_string());
            args.push(port.to_string());
        }

        args
    }

    /// Arguments for `iptables -A`
    pub fn append_args(&self) -> Vec<String> {
        let mut args = vec!["-A".to_string()];
        args.extend(self.filter_args());
        args
    }

    /// Arguments for `iptables -D`. Deletion is exact-match on the same signature.
    pub fn delete_args(&self) -> Vec<String> {
        let mut args = vec!["-D".to_string()];
        args.extend(self.filter_args());
        args
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Arguments for listing rules with packet/byte counters
pub fn list_args(chain: Option<Chain>) -> Vec<String> {
    let mut args = vec!["-L".to_string()];
    if let Some(chain) = chain {
        args.push(chain.as_str().to_string());
    }
    args.push("-n".to_string());
    args.push("-v".to_string());
    args
}

pub fn flush_args(chain: Chain) -> Vec<String> {
    vec!["-F".to_string(), chain.as_str().to_string()]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Normalized outcome of a single tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub status: ResultStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
}

impl ExecutionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Success,
            message: message.into(),
            rules: None,
        }
    }

    pub fn listing(message: impl Into<String>, rules: String) -> Self {
        Self {
            status: ResultStatus::Success,
            message: message.into(),
            rules: Some(rules),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: message.into(),
            rules: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}
