//! Fixed lexical tables consulted by the emotion model.
//!
//! Keywords are matched as lower-case substrings of the (apostrophe
//! normalised) input, so multi-word phrases such as `"miss you"` work as-is.

use peach_types::ResponseStyle;

/// Mood → trigger phrases.  Iteration order is the order moods are boosted.
pub const MOOD_KEYWORDS: &[(&str, &[&str])] = &[
    ("romantic", &["love", "sweetheart", "darling", "miss you", "date", "cuddle"]),
    ("comforting", &["sad", "lonely", "depressed", "hurt", "cry", "pain"]),
    ("playful", &["lol", "haha", "funny", "lmao", "silly", "joke"]),
    ("concerned", &["angry", "mad", "upset", "frustrated", "furious", "fight"]),
    ("excited", &["excited", "yay", "awesome", "let's go", "omg", "can't wait"]),
    ("shy", &["blush", "embarrassed", "shy", "nervous", "awkward"]),
    ("proud", &["achieved", "accomplished", "nailed it", "proud", "promotion"]),
    ("curious", &["why", "how", "what if", "interesting", "wonder"]),
    ("grateful", &["thank you", "grateful", "appreciate", "thanks"]),
    ("jealous", &["jealous", "envy", "wish i had", "they have"]),
    ("guilty", &["sorry", "apologize", "my fault", "regret"]),
    ("motivated", &["let's do this", "i will", "determined", "motivated"]),
    ("anxious", &["worried", "anxious", "panic", "stress", "afraid"]),
    ("peaceful", &["calm", "serene", "peaceful", "tranquil", "zen"]),
    ("melancholy", &["nostalgic", "bittersweet", "fading", "miss old days"]),
    ("flirty", &["hey you", "cutie", "handsome", "wink", "tease", "😏"]),
    ("hopeful", &["dream", "hope", "believe", "someday", "faith"]),
    ("lonely", &["alone", "nobody", "left out", "unseen"]),
    ("conflicted", &["torn", "confused", "mixed feelings", "unsure"]),
    ("numb", &["empty", "nothing", "burned out", "numb"]),
    ("shame", &["i hate myself", "i'm the problem", "i'm worthless"]),
    ("awe", &["wow", "amazing", "incredible", "breathtaking", "divine"]),
    ("vulnerable", &["honestly", "i'm scared to say", "this is hard to admit"]),
    ("inspired", &["i want to do that", "so powerful", "that moved me", "i admire"]),
    ("embarrassed", &["oops", "that was dumb", "shouldn't have said that"]),
    ("protective", &["i'll protect you", "i've got you", "you're safe with me"]),
    ("resentful", &["not fair", "why always me", "i'm done", "taken for granted"]),
    ("joyful", &["pure joy", "i'm glowing", "bliss", "so happy"]),
    ("affectionate", &["sweetie", "snuggle", "you're my favorite", "dear"]),
    ("cynical", &["sure, whatever", "like that'll happen", "typical", "why bother"]),
    ("wistful", &["i wish it lasted", "i miss that time", "those days were different"]),
    ("tangled", &["i don't know how to feel", "mixed emotions", "confused but feeling a lot"]),
];

/// Episodic tag → mood it stirs when the memory is processed.
pub const TAG_MOODS: &[(&str, &str)] = &[
    ("guilt", "guilty"),
    ("nostalgia", "melancholy"),
    ("dream", "hopeful"),
    ("hurt", "comforting"),
    ("love", "romantic"),
    ("funny", "playful"),
    ("excited", "excited"),
    ("stress", "anxious"),
];

/// Mood pairs that pull in opposite directions.
pub const CONTRADICTORY_PAIRS: &[(&str, &str)] = &[
    ("hopeful", "numb"),
    ("romantic", "lonely"),
    ("guilty", "proud"),
    ("excited", "anxious"),
    ("grateful", "resentful"),
];

/// Mood pairs that merge into a single named feeling.
pub const POETIC_BLENDS: &[((&str, &str), &str)] = &[
    (("melancholy", "romantic"), "longing"),
    (("anxious", "hopeful"), "nervous optimism"),
    (("playful", "flirty"), "cheeky charm"),
    (("peaceful", "grateful"), "contentment"),
    (("concerned", "guilty"), "remorseful"),
    (("excited", "motivated"), "fired up"),
];

/// Lower-case `text` and fold typographic apostrophes to ASCII.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// Moods whose keyword list matches `text`.
pub fn matching_moods(text: &str) -> Vec<&'static str> {
    let lowered = normalize(text);
    MOOD_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(mood, _)| *mood)
        .collect()
}

/// Mood stirred by an episodic tag, if any.
pub fn mood_for_tag(tag: &str) -> Option<&'static str> {
    TAG_MOODS.iter().find(|(t, _)| *t == tag).map(|(_, m)| *m)
}

/// Order-insensitive lookup in the contradictory pair table.
pub fn is_contradictory(a: &str, b: &str) -> bool {
    CONTRADICTORY_PAIRS
        .iter()
        .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
}

/// Order-insensitive lookup in the poetic blend table.
pub fn poetic_blend(a: &str, b: &str) -> Option<&'static str> {
    POETIC_BLENDS
        .iter()
        .find(|((x, y), _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, name)| *name)
}

/// Style implied by the dominant mood alone.
pub fn style_for_mood(mood: &str) -> ResponseStyle {
    match mood {
        "playful" | "cheeky" => ResponseStyle::Humor,
        "sad" | "melancholy" | "anxious" => ResponseStyle::Reassurance,
        "affectionate" | "longing" | "loving" => ResponseStyle::Sweetness,
        "curious" | "nostalgic" | "reflective" => ResponseStyle::Reflective,
        _ => ResponseStyle::Neutral,
    }
}
