//! # Key Namespace
//!
//! Every entity lives under `<prefix>:<kind>[:<id>]`. Kind tags are fixed and never contain
//! a colon, so the segment right after the prefix always identifies the entity kind and two
//! different (kind, id) pairs can never produce the same key.
//!
//! | Entity | Key | Structure |
//! |---|---|---|
//! | Restaurant core | `prefix:restaurant:<id>` | hash |
//! | Restaurant details | `prefix:restaurant_details:<id>` | JSON document |
//! | Restaurant cuisines | `prefix:restaurant_cuisines:<id>` | set |
//! | All cuisines | `prefix:cuisines` | set |
//! | Cuisine members | `prefix:cuisine:<name>` | set |
//! | Ranking | `prefix:restaurants_by_rating` | sorted set |
//! | Review list | `prefix:reviews:<restaurantId>` | list |
//! | Review record | `prefix:review_details:<reviewId>` | hash |
//! | Weather cache | `prefix:weather:<restaurantId>` | string with TTL |

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Restaurant,
    RestaurantDetails,
    RestaurantCuisines,
    Cuisines,
    Cuisine,
    RestaurantsByRating,
    Reviews,
    ReviewDetails,
    Weather,
}

impl Kind {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::RestaurantDetails => "restaurant_details",
            Self::RestaurantCuisines => "restaurant_cuisines",
            Self::Cuisines => "cuisines",
            Self::Cuisine => "cuisine",
            Self::RestaurantsByRating => "restaurants_by_rating",
            Self::Reviews => "reviews",
            Self::ReviewDetails => "review_details",
            Self::Weather => "weather",
        }
    }
}

#[derive(Clone, Debug)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, kind: Kind, parts: &[&str]) -> String {
        let mut key = format!("{}:{}", self.prefix, kind.tag());
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub fn restaurant(&self, id: &str) -> String {
        self.key(Kind::Restaurant, &[id])
    }

    pub fn restaurant_details(&self, id: &str) -> String {
        self.key(Kind::RestaurantDetails, &[id])
    }

    pub fn restaurant_cuisines(&self, id: &str) -> String {
        self.key(Kind::RestaurantCuisines, &[id])
    }

    pub fn cuisines(&self) -> String {
        self.key(Kind::Cuisines, &[])
    }

    pub fn cuisine(&self, name: &str) -> String {
        self.key(Kind::Cuisine, &[name])
    }

    pub fn restaurants_by_rating(&self) -> String {
        self.key(Kind::RestaurantsByRating, &[])
    }

    pub fn reviews(&self, restaurant_id: &str) -> String {
        self.key(Kind::Reviews, &[restaurant_id])
    }

    pub fn review_details(&self, review_id: &str) -> String {
        self.key(Kind::ReviewDetails, &[review_id])
    }

    pub fn weather(&self, restaurant_id: &str) -> String {
        self.key(Kind::Weather, &[restaurant_id])
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::KeySpace;

    #[test]
    fn test_layout() {
        let keys = KeySpace::default();
        assert_eq!(keys.restaurant("R1"), "bites:restaurant:R1");
        assert_eq!(keys.restaurant_details("R1"), "bites:restaurant_details:R1");
        assert_eq!(keys.restaurant_cuisines("R1"), "bites:restaurant_cuisines:R1");
        assert_eq!(keys.cuisines(), "bites:cuisines");
        assert_eq!(keys.cuisine("Thai"), "bites:cuisine:Thai");
        assert_eq!(keys.restaurants_by_rating(), "bites:restaurants_by_rating");
        assert_eq!(keys.reviews("R1"), "bites:reviews:R1");
        assert_eq!(keys.review_details("V1"), "bites:review_details:V1");
        assert_eq!(keys.weather("R1"), "bites:weather:R1");
    }

    #[test]
    fn test_shared_id_does_not_collide_across_kinds() {
        let keys = KeySpace::new("t");
        let id = "abc";
        let all = [
            keys.restaurant(id),
            keys.restaurant_details(id),
            keys.restaurant_cuisines(id),
            keys.cuisine(id),
            keys.reviews(id),
            keys.review_details(id),
            keys.weather(id),
            keys.cuisines(),
            keys.restaurants_by_rating(),
        ];
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_custom_prefix() {
        let keys = KeySpace::new("staging");
        assert_eq!(keys.restaurant("x"), "staging:restaurant:x");
    }
}
