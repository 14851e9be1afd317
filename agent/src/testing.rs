//! In-memory packet filter used by the executor and API tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::executor::{CommandOutput, CommandRunner};
use crate::rules::Chain;

const CHAINS: [&str; 3] = ["INPUT", "FORWARD", "OUTPUT"];

#[derive(Default)]
struct State {
    chains: HashMap<String, Vec<Vec<String>>>,
    calls: Vec<Vec<String>>,
    silent_failure: Option<i32>,
    missing: bool,
}

/// Emulates `iptables` / `iptables-save` closely enough for behavioural tests:
/// append, exact-match delete, list with counters, flush and save.
#[derive(Default)]
pub struct FakeIptables {
    state: Mutex<State>,
}

impl FakeIptables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every argv seen, including the program name
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn rule_count(&self, chain: Chain) -> usize {
        self.state
            .lock()
            .unwrap()
            .chains
            .get(chain.as_str())
            .map_or(0, Vec::len)
    }

    /// Make the next invocations exit with `code` and no stderr
    pub fn fail_silently(&self, code: i32) {
        self.state.lock().unwrap().silent_failure = Some(code);
    }

    /// Make every invocation fail to spawn
    pub fn set_missing(&self) {
        self.state.lock().unwrap().missing = true;
    }

    /// Number of rule rows in `iptables -L -n -v` output
    pub fn listed_rule_lines(listing: &str) -> usize {
        listing
            .lines()
            .filter(|line| {
                let trimmed = line.trim();
                !trimmed.is_empty()
                    && !trimmed.starts_with("Chain ")
                    && !trimmed.starts_with("pkts ")
            })
            .count()
    }

    fn handle_iptables(state: &mut State, args: &[String]) -> CommandOutput {
        match args.first().map(String::as_str) {
            Some("-A") => {
                let chain = args[1].clone();
                state.chains.entry(chain).or_default().push(args[2..].to_vec());
                ok(String::new())
            }
            Some("-D") => {
                let rules = state.chains.entry(args[1].clone()).or_default();
                match rules.iter().position(|r| r[..] == args[2..]) {
                    Some(index) => {
                        rules.remove(index);
                        ok(String::new())
                    }
                    None => fail(
                        1,
                        "iptables: Bad rule (does a matching rule exist in that chain?).\n",
                    ),
                }
            }
            Some("-L") => {
                let chains: Vec<&str> = match args.get(1).map(String::as_str) {
                    Some(name) if !name.starts_with('-') => vec![name],
                    _ => CHAINS.to_vec(),
                };
                let mut out = String::new();
                for (i, name) in chains.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    out.push_str(&render_chain(name, state.chains.get(*name)));
                }
                ok(out)
            }
            Some("-F") => {
                state.chains.remove(&args[1]);
                ok(String::new())
            }
            _ => fail(2, "iptables: unknown option\n"),
        }
    }

    fn handle_save(state: &State) -> CommandOutput {
        let mut out = String::from("*filter\n");
        for name in CHAINS {
            out.push_str(&format!(":{name} ACCEPT [0:0]\n"));
        }
        for name in CHAINS {
            for rule in state.chains.get(name).into_iter().flatten() {
                out.push_str(&format!("-A {name} {}\n", rule.join(" ")));
            }
        }
        out.push_str("COMMIT\n");
        ok(out)
    }
}

#[async_trait]
impl CommandRunner for FakeIptables {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();

        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().cloned());
        state.calls.push(argv.clone());

        if state.missing {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }
        if let Some(code) = state.silent_failure {
            return Ok(fail(code, ""));
        }

        let argv = if argv[0] == "sudo" { &argv[1..] } else { &argv[..] };
        let output = match argv[0].as_str() {
            "iptables" => Self::handle_iptables(&mut state, &argv[1..]),
            "iptables-save" => Self::handle_save(&state),
            other => fail(127, &format!("{other}: command not found\n")),
        };
        Ok(output)
    }
}

fn render_chain(name: &str, rules: Option<&Vec<Vec<String>>>) -> String {
    let mut out = format!("Chain {name} (policy ACCEPT 0 packets, 0 bytes)\n");
    out.push_str(" pkts bytes target     prot opt in     out     source               destination\n");
    for rule in rules.into_iter().flatten() {
        let flag = |f: &str| {
            rule.iter()
                .position(|a| a == f)
                .and_then(|i| rule.get(i + 1))
                .cloned()
        };
        let target = flag("-j").unwrap_or_default();
        let proto = flag("-p").unwrap_or_else(|| "all".to_string());
        let source = flag("-s").unwrap_or_else(|| "0.0.0.0/0".to_string());
        let destination = flag("-d").unwrap_or_else(|| "0.0.0.0/0".to_string());
        let extra = flag("--dport")
            .map(|port| format!("{proto} dpt:{port}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "    0     0 {target:<10} {proto:<4} --  *      *       {source:<20} {destination:<20} {extra}\n"
        ));
    }
    out
}

fn ok(stdout: String) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout,
        stderr: String::new(),
    }
}

fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
