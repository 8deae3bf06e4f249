use once_cell::sync::Lazy;
use std::collections::HashMap;

use sweep_common::ServiceLookup;

/// Well-known TCP ports grouped by protocol family.
const WELL_KNOWN: &[(u16, &str)] = &[
    // File transfer
    (20, "ftp-data"),
    (21, "ftp"),
    (69, "tftp"),
    (873, "rsync"),
    (990, "ftps"),
    (2049, "nfs"),
    // Remote shells
    (22, "ssh"),
    (23, "telnet"),
    (512, "exec"),
    (513, "login"),
    (514, "shell"),
    (3389, "ms-wbt-server"),
    (5900, "vnc"),
    (5901, "vnc-1"),
    (5902, "vnc-2"),
    // Mail
    (25, "smtp"),
    (106, "pop3pw"),
    (109, "pop2"),
    (110, "pop3"),
    (143, "imap"),
    (220, "imap3"),
    (465, "smtps"),
    (587, "submission"),
    (993, "imaps"),
    (995, "pop3s"),
    // Naming and directory
    (43, "whois"),
    (53, "domain"),
    (88, "kerberos-sec"),
    (389, "ldap"),
    (636, "ldaps"),
    (3268, "globalcatLDAP"),
    // Web
    (80, "http"),
    (443, "https"),
    (3000, "ppp"),
    (3128, "squid-http"),
    (8000, "http-alt"),
    (8008, "http"),
    (8080, "http-proxy"),
    (8443, "https-alt"),
    (8888, "sun-answerbook"),
    // Windows and RPC
    (111, "rpcbind"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (445, "microsoft-ds"),
    (5985, "wsman"),
    (5986, "wsmans"),
    // Network management
    (79, "finger"),
    (113, "ident"),
    (119, "nntp"),
    (123, "ntp"),
    (161, "snmp"),
    (162, "snmptrap"),
    (179, "bgp"),
    (1080, "socks"),
    // Chat
    (194, "irc"),
    (5222, "xmpp-client"),
    (6667, "irc"),
    (6697, "ircs-u"),
    // Tunnels and VPN
    (500, "isakmp"),
    (1194, "openvpn"),
    (1723, "pptp"),
    (4500, "nat-t-ike"),
    // Databases
    (1433, "ms-sql-s"),
    (1521, "oracle"),
    (3306, "mysql"),
    (5432, "postgresql"),
    (6379, "redis"),
    (9200, "wap-wsp"),
    (11211, "memcache"),
    (27017, "mongod"),
    // Messaging
    (1883, "mqtt"),
    (5672, "amqp"),
    (8883, "secure-mqtt"),
    // Containers and monitoring
    (2375, "docker"),
    (2376, "docker-s"),
    (6443, "sun-sr-https"),
    (9090, "zeus-admin"),
    (9418, "git"),
];

static TABLE: Lazy<HashMap<u16, &'static str>> =
    Lazy::new(|| WELL_KNOWN.iter().copied().collect());

/// Static lookup over the well-known TCP ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortTable;

impl PortTable {
    pub fn new() -> Self {
        Self
    }

    pub fn len(&self) -> usize {
        TABLE.len()
    }

    pub fn is_empty(&self) -> bool {
        TABLE.is_empty()
    }
}

impl ServiceLookup for PortTable {
    fn service_name(&self, port: u16) -> Option<&str> {
        TABLE.get(&port).copied()
    }
}
