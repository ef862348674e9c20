// Event type and well-known field names reported by the webhook provider

pub const EVENT_VERIFICATION: &str = "verification";
pub const EVENT_USER_JOIN: &str = "user.join";
pub const EVENT_USER_LEAVE: &str = "user.leave";
pub const EVENT_PLAYER_PLACE: &str = "player.place";
pub const EVENT_PLAYER_DEATH_STARVATION: &str = "player.death_starvation";
pub const EVENT_PLAYER_DEATH_ENVIRONMENT: &str = "player.death_environment";
pub const EVENT_PLAYER_KILL: &str = "player.kill";
pub const EVENT_PLAYER_DAMAGE: &str = "player.damage";

pub const FIELD_CFTOOLS_ID: &str = "cftools_id";
pub const FIELD_PLAYER_ID: &str = "player_id";
pub const FIELD_VICTIM_ID: &str = "victim_id";
pub const FIELD_MURDERER_ID: &str = "murderer_id";

/// Fields that identify the subject of an event, highest priority first.
pub const SUBJECT_ID_FIELDS: [&str; 4] = [
    FIELD_CFTOOLS_ID,
    FIELD_MURDERER_ID,
    FIELD_PLAYER_ID,
    FIELD_VICTIM_ID,
];

/// Fields rendered as notification metadata, in display order.
pub const METADATA_FIELDS: [(&str, &str); 13] = [
    ("player_name", "Name"),
    ("player_steam64", "Steam ID"),
    (FIELD_CFTOOLS_ID, "CFTools ID"),
    ("player_playtime", "Playtime"),
    ("victim", "Victim"),
    ("victim_position", "Victim Position"),
    (FIELD_VICTIM_ID, "Victim CFTools ID"),
    ("murderer", "Murderer"),
    (FIELD_MURDERER_ID, "Murderer CFTools ID"),
    ("weapon", "Weapon"),
    ("damage", "Damage points"),
    ("distance", "Distance in meter"),
    ("item", "Item"),
];

pub const FLAVOR_CFTOOLS: &str = "WebHookFlavor.CFTOOLS";
pub const FLAVOR_DISCORD: &str = "WebHookFlavor.DISCORD";
