//! Delivery item labels.

use courier_protocol::TASK_NAME_FIELD_LEN;
use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "Fragile", "Frozen", "Urgent", "Heavy", "Fresh", "Sealed", "Bulky", "Tiny", "Priority",
    "Chilled", "Antique", "Spare", "Rush", "Signed", "Padded", "Oversized",
];

const ITEMS: &[&str] = &[
    "Parcel", "Pizza", "Flowers", "Documents", "Groceries", "Medicine", "Battery Pack",
    "Toolbox", "Coffee Beans", "Textbooks", "Keyboard", "Cake", "Bicycle Tire", "Lamp",
    "Houseplant", "Letters",
];

/// A random "<adjective> <item>" label that fits the wire task name field.
pub fn item_name<R: Rng>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Plain");
    let item = ITEMS.choose(rng).copied().unwrap_or("Parcel");
    let mut name = format!("{adjective} {item}");
    name.truncate(TASK_NAME_FIELD_LEN);
    name
}
