//! English to Nepali term tables used by the Panchang day view, plus
//! Devanagari numeral conversion.

pub type Table = &'static [(&'static str, &'static str)];

pub const TITHI: Table = &[
    ("Pratipada", "प्रतिपदा"),
    ("Dwitiya", "द्वितीया"),
    ("Tritiya", "तृतीया"),
    ("Chaturthi", "चतुर्थी"),
    ("Panchami", "पञ्चमी"),
    ("Shashthi", "षष्ठी"),
    ("Saptami", "सप्तमी"),
    ("Ashtami", "अष्टमी"),
    ("Navami", "नवमी"),
    ("Dashami", "दशमी"),
    ("Ekadashi", "एकादशी"),
    ("Dwadashi", "द्वादशी"),
    ("Trayodashi", "त्रयोदशी"),
    ("Chaturdashi", "चतुर्दशी"),
    ("Purnima", "पूर्णिमा"),
    ("Amavasya", "अमावस्या"),
];

pub const NAKSHATRA: Table = &[
    ("Ashwini", "अश्विनी"),
    ("Bharani", "भरणी"),
    ("Krittika", "कृत्तिका"),
    ("Rohini", "रोहिणी"),
    ("Mrigashira", "मृगशिरा"),
    ("Ardra", "आर्द्रा"),
    ("Punarvasu", "पुनर्वसु"),
    ("Pushya", "पुष्य"),
    ("Ashlesha", "आश्लेषा"),
    ("Magha", "मघा"),
    ("Purva Phalguni", "पूर्व फाल्गुनी"),
    ("Uttara Phalguni", "उत्तर फाल्गुनी"),
    ("Hasta", "हस्त"),
    ("Chitra", "चित्रा"),
    ("Swati", "स्वाती"),
    ("Vishakha", "विशाखा"),
    ("Anuradha", "अनुराधा"),
    ("Jyeshtha", "ज्येष्ठा"),
    ("Mula", "मूल"),
    ("Purva Ashadha", "पूर्वाषाढा"),
    ("Uttara Ashadha", "उत्तराषाढा"),
    ("Shravana", "श्रवण"),
    ("Dhanishtha", "धनिष्ठा"),
    ("Shatabhisha", "शतभिषा"),
    ("Purva Bhadrapada", "पूर्वभाद्रपद"),
    ("Uttara Bhadrapada", "उत्तरभाद्रपद"),
    ("Revati", "रेवती"),
];

pub const YOGA: Table = &[
    ("Vishkambha", "विष्कम्भ"),
    ("Priti", "प्रीति"),
    ("Ayushman", "आयुष्मान्"),
    ("Saubhagya", "सौभाग्य"),
    ("Shobhana", "शोभन"),
    ("Atiganda", "अतिगण्ड"),
    ("Sukarma", "सुकर्म"),
    ("Dhriti", "धृति"),
    ("Shula", "शूल"),
    ("Ganda", "गण्ड"),
    ("Vriddhi", "वृद्धि"),
    ("Dhruva", "ध्रुव"),
    ("Vyaghata", "व्याघात"),
    ("Harshana", "हर्षण"),
    ("Vajra", "वज्र"),
    ("Siddhi", "सिद्धि"),
    ("Vyatipata", "व्यतिपात"),
    ("Variyan", "वरीयान्"),
    ("Parigha", "परिघ"),
    ("Shiva", "शिव"),
    ("Siddha", "सिद्ध"),
    ("Sadhya", "साध्य"),
    ("Shubha", "शुभ"),
    ("Shukla", "शुक्ल"),
    ("Brahma", "ब्रह्म"),
    ("Indra", "इन्द्र"),
    ("Vaidhriti", "वैधृति"),
];

pub const KARANA: Table = &[
    ("Kimstughna", "किंस्तुघ्न"),
    ("Bava", "बव"),
    ("Balava", "बालव"),
    ("Kaulava", "कौलव"),
    ("Taitila", "तैतिल"),
    ("Gara", "गर"),
    ("Vanija", "वणिज"),
    ("Vishti", "विष्टि"),
    ("Shakuni", "शकुनि"),
    ("Chatushpada", "चतुष्पाद"),
    ("Naga", "नाग"),
    ("Kintughna", "किंतुघ्न"),
];

pub const HINDU_MONTH: Table = &[
    ("Chaitra", "चैत"),
    ("Vaishakha", "बैशाख"),
    ("Jyeshtha", "जेठ"),
    ("Ashadha", "असार"),
    ("Shravana", "साउन"),
    ("Bhadrapada", "भदौ"),
    ("Ashwin", "असोज"),
    ("Kartika", "कार्तिक"),
    ("Margashirsha", "मंसिर"),
    ("Pausha", "पुस"),
    ("Magha", "माघ"),
    ("Phalguna", "फागुन"),
];

pub const SIGNS: Table = &[
    ("Aries", "मेष"),
    ("Taurus", "वृषभ"),
    ("Gemini", "मिथुन"),
    ("Cancer", "कर्क"),
    ("Leo", "सिंह"),
    ("Virgo", "कन्या"),
    ("Libra", "तुला"),
    ("Scorpio", "वृश्चिक"),
    ("Sagittarius", "धनु"),
    ("Capricorn", "मकर"),
    ("Aquarius", "कुम्भ"),
    ("Pisces", "मीन"),
];

pub const AYANA: Table = &[("Uttarayana", "उत्तरायण"), ("Dakshinayana", "दक्षिणायन")];

pub const NAKSHATRA_LORD: Table = &[
    ("Ketu", "केतु"),
    ("Venus", "शुक्र"),
    ("Sun", "सूर्य"),
    ("Moon", "चन्द्र"),
    ("Mars", "मंगल"),
    ("Rahu", "राहु"),
    ("Jupiter", "गुरु"),
    ("Saturn", "शनि"),
    ("Mercury", "बुध"),
];

pub const ASPECTS: Table = &[
    ("Conjunction", "संयोग"),
    ("Sextile", "षष्ठांश"),
    ("Square", "चतुर्थांश"),
    ("Trine", "त्रिकोण"),
    ("Opposition", "विपरीत"),
    ("Minor Aspect", "लघु दृष्टि"),
];

/// Muhurat and inauspicious-period names, English and legacy spellings.
pub const MUHURATS: Table = &[
    ("Brahma Muhurat", "ब्रह्म मुहूर्त"),
    ("Abhijit Muhurat", "अभिजीत मुहूर्त"),
    ("Godhuli Muhurat", "गोधूलि मुहूर्त"),
    ("Amrit Kalam", "अमृत काल"),
    ("Vijaya Muhurat", "विजय मुहूर्त"),
    ("Gulika Kalam", "गुलिक काल"),
    ("Rahu Kalam", "राहु काल"),
    ("Yamaganda", "यमगण्ड"),
    ("राहू काल", "राहु काल"),
    ("अमृत बेला", "अमृत बेला"),
    ("व्रज्याम काल", "वर्ज्यम काल"),
];

/// Nakshatra (Nepali) to its ruling graha (Nepali).
pub const NAKSHATRA_LORDS_NE: Table = &[
    ("अश्विनी", "केतु"),
    ("भरणी", "शुक्र"),
    ("कृत्तिका", "सूर्य"),
    ("रोहिणी", "चन्द्र"),
    ("मृगशिरा", "मंगल"),
    ("आद्रा", "राहु"),
    ("पुनर्वसु", "गुरु"),
    ("पुष्य", "शनि"),
    ("आश्लेषा", "बुध"),
    ("मघा", "केतु"),
    ("पूर्वाफाल्गुनी", "शुक्र"),
    ("उत्तराफाल्गुनी", "सूर्य"),
    ("हस्त", "चन्द्र"),
    ("चित्रा", "मंगल"),
    ("स्वाती", "राहु"),
    ("विशाखा", "गुरु"),
    ("अनुराधा", "शनि"),
    ("ज्येष्ठा", "बुध"),
    ("मूल", "केतु"),
    ("पूर्वाषाढा", "शुक्र"),
    ("उत्तराषाढा", "सूर्य"),
    ("श्रवण", "चन्द्र"),
    ("धनिष्ठा", "मंगल"),
    ("शतभिषा", "राहु"),
    ("पूर्वाभाद्रपद", "गुरु"),
    ("उत्तराभाद्रपद", "शनि"),
    ("रेवती", "बुध"),
];

pub fn lookup(table: Table, term: &str) -> Option<&'static str> {
    let term = term.trim();
    table.iter().find(|(k, _)| *k == term).map(|(_, v)| *v)
}

/// Translate `term`, returning it unchanged when the table has no entry.
pub fn translate(table: Table, term: &str) -> String {
    lookup(table, term)
        .map(str::to_string)
        .unwrap_or_else(|| term.to_string())
}

const NEPALI_DIGITS: [char; 10] = ['०', '१', '२', '३', '४', '५', '६', '७', '८', '९'];

pub fn to_nepali_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => NEPALI_DIGITS[d as usize],
            _ => c,
        })
        .collect()
}

/// Devanagari digits to ASCII; the visarga and full-width colons used as
/// time separators in the almanac become `:`.
pub fn to_english_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'ः' | '∶' | '：' => ':',
            _ => match NEPALI_DIGITS.iter().position(|d| *d == c) {
                Some(i) => char::from(b'0' + i as u8),
                None => c,
            },
        })
        .collect()
}
