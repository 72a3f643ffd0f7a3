//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Huddle Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[identity]
# id = ""                  # empty: a fresh id per run
# display_name = "guest"
# avatar_url = "https://example.com/me.png"
# role = "member"          # guest | member | moderator | owner

[directory]
# moderators = ["alice", "bob"]

[room]
# default_space = "lobby"
# reaction_ttl_ms = 3000   # 500-60000
# message_ttl_ms = 6000    # 500-60000
# max_message_len = 280    # 1-2000
# negotiation_timeout_secs = 10   # 1-120
# max_negotiation_retries = 3     # 0-10
# deterministic_tie_break = true
#
# [[room.ice_servers]]
# urls = ["stun:stun.l.google.com:19302"]
#
# [[room.ice_servers]]
# urls = ["turn:turn.example.com:3478"]
# username = "user"
# credential = "secret"

[realtime]
# url = "ws://127.0.0.1:4000/socket/websocket"
# project_ref = ""         # managed Supabase Realtime project (used when url is empty)
# api_key = ""
# heartbeat_interval = 25  # 5-300
# reconnect_delay = 1
# max_reconnect_delay = 30
# join_timeout = 10        # 1-120

[relay]
# bind = "0.0.0.0"
# port = 4000
# idle_timeout = 60        # 10-3600

[logging]
# level = "INFO"           # TRACE | DEBUG | INFO | WARNING | ERROR
# json = false
"##
    .to_string()
}
