//! Built-in check types.
//!
//! Each builder renders the command line a competition scorer would run by
//! hand. Passwords never appear as arguments: they are bound into the child
//! environment under the variable the client tool reads (`PGPASSWORD`,
//! `MYSQL_PWD`, `SSHPASS`).

use crate::error::Result;
use crate::invocation::Invocation;
use crate::registry::{BuildTarget, CheckDescriptor};

pub const POSTGRESQL: &str = "POSTGRESQLCheck";
pub const MYSQL: &str = "MYSQLCheck";
pub const SSH: &str = "SSHCheck";
pub const HTTP: &str = "HTTPCheck";
pub const HTTPS: &str = "HTTPSCheck";
pub const DNS: &str = "DNSCheck";
pub const ICMP: &str = "ICMPCheck";

pub fn builtin() -> Vec<CheckDescriptor> {
    vec![
        CheckDescriptor::new(POSTGRESQL, postgresql)
            .required(&["database", "command"])
            .with_account(),
        CheckDescriptor::new(MYSQL, mysql)
            .required(&["database", "command"])
            .with_account(),
        CheckDescriptor::new(SSH, ssh).required(&["commands"]).with_account(),
        CheckDescriptor::new(HTTP, http).required(&["useragent", "vhost", "uri"]),
        CheckDescriptor::new(HTTPS, https).required(&["useragent", "vhost", "uri"]),
        CheckDescriptor::new(DNS, dns).required(&["qtype", "domain"]),
        CheckDescriptor::new(ICMP, icmp),
    ]
}

/// `psql -h 'HOST' -p PORT -U 'USER' -c 'COMMAND' 'DATABASE'`
fn postgresql(t: &BuildTarget<'_>) -> Result<Invocation> {
    let account = t.account()?;
    Ok(Invocation::new("psql")
        .arg("-h")
        .quoted_arg(t.host)
        .arg("-p")
        .arg(t.port.to_string())
        .arg("-U")
        .quoted_arg(&account.username)
        .arg("-c")
        .quoted_arg(t.property("command")?)
        .quoted_arg(t.property("database")?)
        .secret_env("PGPASSWORD", account.secret.clone()))
}

/// `mysql -h 'HOST' -P PORT -u 'USER' 'DATABASE' -e 'COMMAND'`
fn mysql(t: &BuildTarget<'_>) -> Result<Invocation> {
    let account = t.account()?;
    Ok(Invocation::new("mysql")
        .arg("-h")
        .quoted_arg(t.host)
        .arg("-P")
        .arg(t.port.to_string())
        .arg("-u")
        .quoted_arg(&account.username)
        .quoted_arg(t.property("database")?)
        .arg("-e")
        .quoted_arg(t.property("command")?)
        .secret_env("MYSQL_PWD", account.secret.clone()))
}

/// `sshpass -e ssh -o ... -p PORT 'USER@HOST' 'COMMANDS'`
fn ssh(t: &BuildTarget<'_>) -> Result<Invocation> {
    let account = t.account()?;
    Ok(Invocation::new("sshpass")
        .arg("-e")
        .arg("ssh")
        .arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-o")
        .arg("UserKnownHostsFile=/dev/null")
        .arg("-p")
        .arg(t.port.to_string())
        .quoted_arg(format!("{}@{}", account.username, t.host))
        .quoted_arg(t.property("commands")?)
        .secret_env("SSHPASS", account.secret.clone()))
}

fn http(t: &BuildTarget<'_>) -> Result<Invocation> {
    web(t, "http")
}

fn https(t: &BuildTarget<'_>) -> Result<Invocation> {
    web(t, "https")
}

/// `curl -s -S -4 -v -L [-k] --header 'Host: VHOST' -A 'AGENT' 'SCHEME://HOST:PORT/URI'`
fn web(t: &BuildTarget<'_>, scheme: &str) -> Result<Invocation> {
    let mut inv = Invocation::new("curl")
        .arg("-s")
        .arg("-S")
        .arg("-4")
        .arg("-v")
        .arg("-L");
    if scheme == "https" {
        inv = inv.arg("-k");
    }
    Ok(inv
        .arg("--header")
        .quoted_arg(format!("Host: {}", t.property("vhost")?))
        .arg("-A")
        .quoted_arg(t.property("useragent")?)
        .quoted_arg(format!(
            "{scheme}://{}:{}{}",
            t.host,
            t.port,
            t.property("uri")?
        )))
}

/// `dig @HOST -p PORT -t QTYPE -q DOMAIN`
fn dns(t: &BuildTarget<'_>) -> Result<Invocation> {
    Ok(Invocation::new("dig")
        .arg(format!("@{}", t.host))
        .arg("-p")
        .arg(t.port.to_string())
        .arg("-t")
        .arg(t.property("qtype")?)
        .arg("-q")
        .arg(t.property("domain")?))
}

/// `ping -c 1 HOST`
fn icmp(t: &BuildTarget<'_>) -> Result<Invocation> {
    Ok(Invocation::new("ping").arg("-c").arg("1").arg(t.host))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
