/// Constants module to avoid magic values in the codebase

// Device defaults (command-surface layer only; the gateway never reads these)
pub const DEFAULT_HOST: &str = "norns.local";
pub const DEFAULT_USERNAME: &str = "we";
pub const DEFAULT_PASSWORD: &str = "sleep";

// Environment variables consulted by the config loader
pub const ENV_HOST: &str = "NORNS_HOST";
pub const ENV_USER: &str = "NORNS_USER";
pub const ENV_PASS: &str = "NORNS_PASS";

// Remote side
pub const DEFAULT_REPL_COMMAND: &str = "maiden repl";
pub const DEFAULT_DEPLOY_PATH: &str = "~/dust/code/Foobar";

// Test manifest
pub const RUNTIME_SPEC: &str = "test/norns_runtime_spec.lua";
pub const BUSTED_SPEC: &str = "test/norns_busted_spec.lua";

// Result markers scanned from test output
pub const SUCCESS_MARKERS: &[&str] = &["✅", "PASSED"];
pub const FAILURE_MARKERS: &[&str] = &["❌", "FAILED"];

// File sync
pub const DEFAULT_SYNC_PROGRAM: &str = "rsync";
pub const DEFAULT_SYNC_EXCLUDES: &[&str] = &[".git"];

// ssh exits with this when the failure is its own rather than the remote command's
pub const SSH_TRANSPORT_FAILURE_CODE: i32 = 255;

// Unsafe Lua constructs (advisory filter, not a sandbox)
pub const UNSAFE_PATTERNS: &[&str] = &[
    "os.execute",
    "io.open",
    "require(\"io\")",
    "require(\"os\")",
    "file.write",
    "file:write",
    "dofile",
    "loadfile",
    "loadstring",
    "pcall(os.execute",
    "pcall(io.open",
];
