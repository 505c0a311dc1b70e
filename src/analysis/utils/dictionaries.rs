//! Dictionary-based word lists for manuscript analysis
//!
//! Curated lexicons for style flags, tension scoring, entity
//! classification, and promise detection.

use once_cell::sync::Lazy;
use std::collections::HashSet;

fn set(words: &[&'static str]) -> HashSet<&'static str> {
    words.iter().copied().collect()
}

/// Word lists consumed by the style analyzer
pub struct StyleDictionaries;

impl StyleDictionaries {
    /// Perception/cognition verbs that put a filter between reader and scene
    pub fn filter_words() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "saw", "see", "sees", "seeing", "heard", "hear", "hears", "felt", "feel", "feels",
                "noticed", "notice", "notices", "realized", "realize", "realizes", "wondered",
                "wonder", "wonders", "thought", "think", "thinks", "seemed", "seem", "seems",
                "watched", "watch", "watches", "knew", "know", "knows", "decided", "decide",
                "looked", "smelled", "tasted", "observed", "sensed",
            ])
        });
        &SET
    }

    /// Tokens ending in -ly that are not adverbs
    pub fn adverb_exceptions() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "only", "family", "early", "reply", "fly", "holy", "ugly", "belly", "lily", "rely",
                "supply", "apply", "july", "italy", "bully", "jolly", "silly", "friendly", "lonely",
                "lovely", "likely", "daily", "weekly", "monthly", "yearly", "ally", "rally",
                "jelly", "sly", "folly", "curly", "hilly", "chilly", "oily", "costly", "elderly",
                "lowly", "kindly", "deadly", "comply", "anomaly", "assembly", "emily", "molly",
                "sally", "kelly", "polly", "billy", "tally", "wily", "burly", "surly",
            ])
        });
        &SET
    }

    /// Stock phrases flagged as clichés (lowercase)
    pub fn cliches() -> &'static [&'static str] {
        static LIST: &[&str] = &[
            "dark and stormy night",
            "at the end of the day",
            "in the nick of time",
            "heart of gold",
            "avoid it like the plague",
            "calm before the storm",
            "only time will tell",
            "time stood still",
            "crystal clear",
            "scared to death",
            "cold as ice",
            "little did he know",
            "little did she know",
            "all hell broke loose",
            "a chill ran down",
            "let out a breath",
            "breath she didn't know she was holding",
            "breath he didn't know he was holding",
            "blood ran cold",
            "dead as a doornail",
            "fit as a fiddle",
            "in the blink of an eye",
            "it was all a dream",
            "without further ado",
            "the rest is history",
            "sent shivers down",
            "easier said than done",
            "tip of the iceberg",
            "last but not least",
            "needle in a haystack",
        ];
        LIST
    }

    /// High-frequency function words excluded from vocabulary rankings
    pub fn stopwords() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "a", "an", "the", "and", "or", "but", "if", "then", "so", "of", "at", "by", "for",
                "with", "about", "against", "between", "into", "through", "during", "before",
                "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off",
                "over", "under", "again", "further", "once", "here", "there", "when", "where",
                "why", "how", "all", "any", "both", "each", "few", "more", "most", "other",
                "some", "such", "no", "nor", "not", "own", "same", "than", "too", "very", "can",
                "will", "just", "don't", "should", "now", "i", "me", "my", "we", "our", "you",
                "your", "he", "him", "his", "she", "her", "hers", "it", "its", "they", "them",
                "their", "what", "which", "who", "whom", "this", "that", "these", "those", "am",
                "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do",
                "does", "did", "would", "could", "as", "until", "while", "because", "said",
                "like", "one", "back", "only", "even",
            ])
        });
        &SET
    }
}

/// Word lists consumed by the structural parser
pub struct NarrativeDictionaries;

impl NarrativeDictionaries {
    /// Words that raise scene tension
    pub fn tension_words() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "blood", "scream", "screamed", "screaming", "gun", "knife", "blade", "run", "ran",
                "running", "fear", "afraid", "terror", "terrified", "danger", "dead", "death",
                "die", "died", "kill", "killed", "fight", "fought", "attack", "attacked", "shout",
                "shouted", "panic", "gasp", "gasped", "trembled", "shaking", "crash", "crashed",
                "explosion", "fire", "burning", "chase", "hunted", "trapped", "threat", "desperate",
                "pain", "wound", "wounded", "rage", "furious", "suddenly", "heart", "pounding",
                "dark", "shadow", "shadows", "betrayed", "lie", "lied", "secret", "alarm",
            ])
        });
        &SET
    }

    /// Interior-monologue cues
    pub fn introspection_words() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "thought", "wondered", "remembered", "felt", "realized", "considered", "wished",
                "hoped", "regretted", "imagined", "believed", "doubted", "memory", "memories",
                "mind", "recalled", "pondered",
            ])
        });
        &SET
    }

    /// Common nouns that mark a physical setting
    pub fn setting_nouns() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "kitchen", "forest", "castle", "room", "hall", "street", "city", "village",
                "house", "garden", "river", "beach", "ship", "tavern", "inn", "office", "church",
                "library", "cellar", "attic", "bedroom", "station", "market", "road", "bridge",
                "field", "mountain", "cave", "camp", "palace", "tower", "courtyard", "harbor",
                "alley", "car", "train", "school", "hospital", "bar", "shop", "woods", "desert",
            ])
        });
        &SET
    }

    /// Explicit time-of-day and transition markers (lowercase phrases)
    pub fn time_markers() -> &'static [&'static str] {
        static LIST: &[&str] = &[
            "the next morning",
            "the next day",
            "the following day",
            "that night",
            "that evening",
            "the next week",
            "years later",
            "months later",
            "weeks later",
            "days later",
            "hours later",
            "moments later",
            "later that day",
            "at dawn",
            "at dusk",
            "at midnight",
            "in the morning",
            "in the evening",
            "at noon",
            "yesterday",
            "tomorrow",
            "monday",
            "tuesday",
            "wednesday",
            "thursday",
            "friday",
            "saturday",
            "sunday",
        ];
        LIST
    }
}

/// Word lists consumed by the entity extractor
pub struct EntityDictionaries;

impl EntityDictionaries {
    /// Capitalized tokens that are never names
    pub fn non_names() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "The", "A", "An", "He", "She", "It", "I", "We", "They", "You", "His", "Her",
                "Its", "Our", "Their", "Your", "My", "But", "And", "Or", "So", "Then", "When",
                "Where", "Why", "How", "What", "Who", "Which", "If", "In", "On", "At", "To",
                "For", "From", "With", "By", "As", "This", "That", "These", "Those", "There",
                "Here", "Yes", "No", "Not", "Now", "Once", "After", "Before", "While", "Still",
                "Even", "Just", "Perhaps", "Maybe", "Every", "Each", "All", "Some", "One",
                "Chapter", "Scene", "Part", "Oh", "Well", "Later", "Suddenly", "Finally",
                "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
                "January", "February", "March", "April", "May", "June", "July", "August",
                "September", "October", "November", "December", "Mr", "Mrs", "Ms", "Dr", "Do",
                "Don't", "Did", "Is", "Was", "Are", "Were", "Had", "Has", "Have", "Let", "God",
                "Nothing", "Something", "Everything", "Someone", "Everyone", "Nobody",
            ])
        });
        &SET
    }

    /// Name suffixes that mark a place
    pub fn location_suffixes() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "Street", "Road", "Avenue", "City", "Town", "Village", "Castle", "Keep", "River",
                "Lake", "Sea", "Ocean", "Forest", "Wood", "Woods", "Mountain", "Mountains",
                "Hill", "Hills", "Valley", "Kingdom", "Empire", "Bridge", "Harbor", "Port",
                "Tower", "Hall", "Manor", "Abbey", "Station", "Island", "Bay", "Desert",
            ])
        });
        &SET
    }

    /// Name heads that mark an object
    pub fn object_keywords() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "Sword", "Blade", "Ring", "Stone", "Book", "Crown", "Amulet", "Key", "Map",
                "Orb", "Staff", "Shield", "Chalice", "Grail", "Codex", "Tome", "Dagger", "Locket",
                "Mirror", "Compass", "Letter", "Scroll",
            ])
        });
        &SET
    }

    /// Prepositions that precede place names
    pub fn location_prepositions() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&["in", "at", "to", "from", "into", "toward", "towards", "near", "across", "through"])
        });
        &SET
    }

    /// Honorifics that introduce a character
    pub fn titles() -> &'static HashSet<&'static str> {
        static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
            set(&[
                "Mr", "Mrs", "Ms", "Miss", "Dr", "Prof", "Sir", "Lord", "Lady", "Captain",
                "King", "Queen", "Prince", "Princess", "Father", "Mother", "Aunt", "Uncle",
                "Sister", "Brother", "Detective", "Officer", "General",
            ])
        });
        &SET
    }
}
