//! Human-readable passphrase codec.
//!
//! Bytes are spelled out over two fixed 256-word lists in the PGP word list
//! tradition: bytes at even offsets draw from the two-syllable list, bytes
//! at odd offsets from the three-syllable list. The alternation means a
//! dropped or duplicated word is caught at decode time instead of silently
//! shifting the rest of the code.
//!
//! A full invitation code is `encode(pass ++ uvarint(slot))` joined with
//! hyphens: two random passphrase bytes followed by the slot number in
//! unsigned LEB128.

/// Number of secret passphrase bytes in an invitation code.
pub const PASS_BYTES: usize = 2;

/// Spell out bytes as words, alternating between the even and odd lists.
pub fn encode(bytes: &[u8]) -> Vec<&'static str> {
    bytes
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if i % 2 == 0 {
                WORDS_EVEN[b as usize]
            } else {
                WORDS_ODD[b as usize]
            }
        })
        .collect()
}

/// Decode a word sequence back into bytes.
///
/// Returns `None` on unknown words or words in the wrong position.
/// Matching is case-insensitive.
pub fn decode(words: &[&str]) -> Option<Vec<u8>> {
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let list = if i % 2 == 0 { &WORDS_EVEN } else { &WORDS_ODD };
            let lower = word.to_ascii_lowercase();
            list.iter().position(|w| *w == lower).map(|p| p as u8)
        })
        .collect()
}

/// Build the hyphen-separated invitation code for a slot and passphrase.
pub fn encode_code(pass: &[u8; PASS_BYTES], slot: u64) -> String {
    let mut bytes = pass.to_vec();
    put_uvarint(&mut bytes, slot);
    encode(&bytes).join("-")
}

/// Parse an invitation code back into its passphrase bytes and slot.
///
/// Returns `None` on unknown words, a short code, or trailing garbage
/// after the slot number.
pub fn decode_code(code: &str) -> Option<([u8; PASS_BYTES], u64)> {
    let words: Vec<&str> = code.split('-').collect();
    let bytes = decode(&words)?;
    if bytes.len() < PASS_BYTES + 1 {
        return None;
    }
    let pass: [u8; PASS_BYTES] = bytes[..PASS_BYTES].try_into().ok()?;
    let (slot, used) = take_uvarint(&bytes[PASS_BYTES..])?;
    if PASS_BYTES + used != bytes.len() {
        return None;
    }
    Some((pass, slot))
}

/// Append the unsigned LEB128 encoding of `x`.
fn put_uvarint(buf: &mut Vec<u8>, mut x: u64) {
    while x >= 0x80 {
        buf.push((x as u8 & 0x7f) | 0x80);
        x >>= 7;
    }
    buf.push(x as u8);
}

/// Read an unsigned LEB128 value, returning it and the bytes consumed.
fn take_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut x = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        x |= u64::from(b & 0x7f)
            .checked_shl(shift)
            .filter(|v| v >> shift == u64::from(b & 0x7f))?;
        if b & 0x80 == 0 {
            return Some((x, i + 1));
        }
        shift += 7;
    }
    None
}

/// Two-syllable words for bytes at even offsets.
pub const WORDS_EVEN: [&str; 256] = [
    "aardvark", "absurd", "accrue", "acme", "adrift", "adult", "afflict", "ahead",
    "aimless", "algol", "allow", "alone", "ammo", "ancient", "apple", "artist",
    "assume", "athens", "atlas", "aztec", "baboon", "backfield", "backward", "banjo",
    "beaming", "bedlamp", "beehive", "beeswax", "befriend", "belfast", "berserk", "billiard",
    "bison", "blackjack", "blockade", "blowtorch", "bluebird", "bombast", "bookshelf", "brackish",
    "breadline", "breakup", "brickyard", "briefcase", "burbank", "button", "buzzard", "cement",
    "chairlift", "chatter", "checkup", "chisel", "clamshell", "classic", "classroom", "cleanup",
    "clockwork", "cobra", "commence", "concert", "cowbell", "crackdown", "cranky", "crowfoot",
    "crucial", "crumpled", "crusade", "cubic", "dashboard", "deadbolt", "deckhand", "dogsled",
    "dragnet", "drainage", "dreadful", "drifter", "dropper", "drumbeat", "drunken", "dupont",
    "dwelling", "eating", "edict", "egghead", "eightball", "endorse", "endow", "enlist",
    "erase", "escape", "exceed", "eyeglass", "eyetooth", "facial", "fallout", "flagpole",
    "flatfoot", "flytrap", "fracture", "framework", "freedom", "frighten", "gazelle", "geiger",
    "glitter", "glucose", "goggles", "goldfish", "gremlin", "guidance", "hamlet", "highchair",
    "hockey", "indoors", "indulge", "inverse", "involve", "island", "jawbone", "keyboard",
    "kickoff", "kiwi", "klaxon", "locale", "lockup", "merit", "minnow", "miser",
    "mohawk", "mural", "music", "necklace", "neptune", "newborn", "nightbird", "oakland",
    "obtuse", "offload", "optic", "orca", "payday", "peachy", "pheasant", "physique",
    "playhouse", "pluto", "preclude", "prefer", "preshrunk", "printer", "prowler", "pupil",
    "puppy", "python", "quadrant", "quiver", "quota", "ragtime", "ratchet", "rebirth",
    "reform", "regain", "reindeer", "rematch", "repay", "retouch", "revenge", "reward",
    "rhythm", "ribcage", "ringbolt", "ringside", "roadblock", "rocket", "rockslide", "rowdy",
    "ruffled", "sailboat", "sawdust", "scallion", "scenic", "scorecard", "scotland", "seabird",
    "select", "sentence", "shadow", "shamrock", "showgirl", "skullcap", "skydive", "slingshot",
    "slowdown", "snapline", "snapshot", "snowcap", "snowslide", "solo", "southward", "soybean",
    "spaniel", "spearhead", "spellbind", "spheroid", "spigot", "spindle", "spyglass", "stagehand",
    "stagnate", "stairway", "standard", "stapler", "steamship", "sterling", "stockman", "stopwatch",
    "stormy", "sugar", "surmount", "suspense", "sweatband", "swelter", "tactics", "talon",
    "tapeworm", "tempest", "tiger", "tissue", "tonic", "topmost", "tracker", "transit",
    "trauma", "treadmill", "trojan", "trouble", "tumor", "tunnel", "tycoon", "uncut",
    "unearth", "unwind", "uproot", "upset", "upshot", "vapor", "village", "virus",
    "vulcan", "waffle", "wallet", "watchword", "wayside", "willow", "woodlark", "zulu",
];

/// Three-syllable words for bytes at odd offsets.
pub const WORDS_ODD: [&str; 256] = [
    "adroitness", "adviser", "aftermath", "aggregate", "alkali", "almighty", "amulet", "amusement",
    "antenna", "applicant", "apollo", "armistice", "article", "asteroid", "atlantic", "atmosphere",
    "autopsy", "babylon", "backwater", "barbecue", "belowground", "bifocals", "bodyguard", "bookseller",
    "borderline", "bottomless", "bradbury", "bravado", "brazilian", "breakaway", "burlington", "businessman",
    "butterfat", "camelot", "candidate", "cannonball", "capricorn", "caravan", "caretaker", "celebrate",
    "cellulose", "certify", "chambermaid", "cherokee", "chicago", "clergyman", "coherence", "combustion",
    "commando", "company", "component", "concurrent", "confidence", "conformist", "congregate", "consensus",
    "consulting", "corporate", "corrosion", "councilman", "crossover", "crucifix", "cumbersome", "customer",
    "dakota", "decadence", "december", "decimal", "designing", "detector", "detergent", "determine",
    "dictator", "dinosaur", "direction", "disable", "disbelief", "disruptive", "distortion", "document",
    "embezzle", "enchanting", "enrollment", "enterprise", "equation", "equipment", "escapade", "eskimo",
    "everyday", "examine", "existence", "exodus", "fascinate", "filament", "finicky", "forever",
    "fortitude", "frequency", "gadgetry", "galveston", "getaway", "glossary", "gossamer", "graduate",
    "gravity", "guitarist", "hamburger", "hamilton", "handiwork", "hazardous", "headwaters", "hemisphere",
    "hesitate", "hideaway", "holiness", "hurricane", "hydraulic", "impartial", "impetus", "inception",
    "indigo", "inertia", "infancy", "inferno", "informant", "insincere", "insurgent", "integrate",
    "intention", "inventive", "istanbul", "jamaica", "jupiter", "leprosy", "letterhead", "liberty",
    "maritime", "matchmaker", "maverick", "medusa", "megaton", "microscope", "microwave", "midsummer",
    "millionaire", "miracle", "misnomer", "molasses", "molecule", "montana", "monument", "mosquito",
    "narrative", "nebula", "newsletter", "norwegian", "october", "ohio", "onlooker", "opulent",
    "orlando", "outfielder", "pacific", "pandemic", "pandora", "paperweight", "paragon", "paragraph",
    "paramount", "passenger", "pedigree", "pegasus", "penetrate", "perceptive", "performance", "pharmacy",
    "phonetic", "photograph", "pioneer", "pocketful", "politeness", "positive", "potato", "processor",
    "provincial", "proximate", "puberty", "publisher", "pyramid", "quantity", "racketeer", "rebellion",
    "recipe", "recover", "repellent", "replica", "reproduce", "resistor", "responsive", "retraction",
    "retrieval", "retrospect", "revenue", "revival", "revolver", "sandalwood", "sardonic", "saturday",
    "savagery", "scavenger", "sensation", "sociable", "souvenir", "specialist", "speculate", "stethoscope",
    "stupendous", "supportive", "surrender", "suspicious", "sympathy", "tambourine", "telephone", "therapist",
    "tobacco", "tolerance", "tomorrow", "torpedo", "tradition", "travesty", "trombonist", "truncated",
    "typewriter", "ultimate", "undaunted", "underfoot", "unicorn", "unify", "universe", "unravel",
    "upcoming", "vacancy", "vagabond", "vertigo", "virginia", "visitor", "vocalist", "voyager",
    "warranty", "waterloo", "whimsical", "wichita", "wilmington", "wyoming", "yesteryear", "yucatan",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_hold_256_distinct_words_each() {
        for list in [&WORDS_EVEN, &WORDS_ODD] {
            let mut sorted: Vec<&str> = list.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 256);
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        for bytes in [
            vec![],
            vec![0u8],
            vec![0u8, 255],
            vec![1, 2, 3, 4, 5],
            (0u8..=255).collect::<Vec<_>>(),
        ] {
            let words = encode(&bytes);
            assert_eq!(decode(&words).unwrap(), bytes);
        }
    }

    #[test]
    fn decode_is_case_insensitive() {
        let words = encode(&[7, 42, 180]);
        let shouted: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let shouted: Vec<&str> = shouted.iter().map(String::as_str).collect();
        assert_eq!(decode(&shouted).unwrap(), vec![7, 42, 180]);
    }

    #[test]
    fn decode_rejects_unknown_words() {
        assert!(decode(&["aardvark", "notaword"]).is_none());
        assert!(decode(&["xyzzy"]).is_none());
    }

    #[test]
    fn decode_rejects_words_in_the_wrong_position() {
        // Both valid words, but each from the other position's list.
        assert!(decode(&["adroitness", "aardvark"]).is_none());
    }

    #[test]
    fn uvarint_round_trips() {
        for x in [0u64, 1, 127, 128, 300, 16384, u64::from(u32::MAX), u64::MAX] {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, x);
            assert_eq!(take_uvarint(&buf), Some((x, buf.len())));
        }
        assert!(take_uvarint(&[]).is_none());
        assert!(take_uvarint(&[0x80]).is_none());
    }

    #[test]
    fn code_round_trips_over_slot_range() {
        for slot in [0u64, 1, 9, 127, 128, 1000, 65535, 1 << 32] {
            let pass = [0xab, 0xcd];
            let code = encode_code(&pass, slot);
            assert_eq!(decode_code(&code), Some((pass, slot)));
        }
    }

    #[test]
    fn code_rejects_truncation_and_garbage() {
        let code = encode_code(&[1, 2], 300);
        let words: Vec<&str> = code.split('-').collect();
        // Too short to contain pass bytes plus a slot.
        assert!(decode_code(&words[..2].join("-")).is_none());
        // A trailing extra word breaks the uvarint framing.
        let mut extended = words.clone();
        extended.push(if extended.len() % 2 == 0 { "aardvark" } else { "adroitness" });
        assert!(decode_code(&extended.join("-")).is_none());
    }
}
