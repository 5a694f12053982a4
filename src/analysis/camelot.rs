//! Camelot wheel notation for detected keys.

/// Wheel numbers indexed by pitch class (C = 0). Major keys sit on the outer
/// wheel (`B`), minor keys on the inner wheel (`A`).
const MAJOR_WHEEL: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];
const MINOR_WHEEL: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

/// Pitch class of a key name. Both enharmonic spellings are accepted, in
/// short (`Db`, `C#`) and long (`D-flat`, `C-sharp`) form.
pub fn pitch_class(name: &str) -> Option<usize> {
    let pc = match name.trim() {
        "C" => 0,
        "C#" | "Db" | "C-sharp" | "D-flat" => 1,
        "D" => 2,
        "D#" | "Eb" | "D-sharp" | "E-flat" => 3,
        "E" => 4,
        "F" => 5,
        "F#" | "Gb" | "F-sharp" | "G-flat" => 6,
        "G" => 7,
        "G#" | "Ab" | "G-sharp" | "A-flat" => 8,
        "A" => 9,
        "A#" | "Bb" | "A-sharp" | "B-flat" => 10,
        "B" => 11,
        _ => return None,
    };
    Some(pc)
}

/// Map a key and scale to Camelot notation, e.g. `("A", "minor")` to `8A`.
/// Unknown pairs come back as `"<key> <scale>"`.
pub fn camelot_key(key: &str, scale: &str) -> String {
    let slot = pitch_class(key).and_then(|pc| match scale.trim().to_ascii_lowercase().as_str() {
        "major" => Some(format!("{}B", MAJOR_WHEEL[pc])),
        "minor" => Some(format!("{}A", MINOR_WHEEL[pc])),
        _ => None,
    });
    slot.unwrap_or_else(|| format!("{} {}", key, scale))
}
