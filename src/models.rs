use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Money amount stored as integer hundredths, mirroring a fixed-point
/// decimal with 5 total digits and 2 fraction digits (max 999.99).
/// Accepts a JSON string or number on input, always renders as a
/// two-fraction-digit string ("5.00").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price(i64);

const PRICE_MAX_HUNDREDTHS: i64 = 99_999;

impl Price {
    pub fn from_hundredths(hundredths: i64) -> Result<Self, String> {
        if hundredths < 0 {
            return Err("Ensure this value is greater than or equal to 0.".to_string());
        }
        if hundredths > PRICE_MAX_HUNDREDTHS {
            return Err("Ensure that there are no more than 5 digits in total.".to_string());
        }
        Ok(Price(hundredths))
    }

    pub fn hundredths(&self) -> i64 {
        self.0
    }

    fn parse_str(s: &str) -> Result<Self, String> {
        let invalid = || "A valid number is required.".to_string();
        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match rest.split_once('.') {
            Some((w, f)) => (w, f),
            None => (rest, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > 2 {
            return Err("Ensure that there are no more than 2 decimal places.".to_string());
        }
        // bound the whole part before parsing so huge inputs cannot overflow
        let significant = whole.trim_start_matches('0');
        if significant.len() > 3 {
            return Err("Ensure that there are no more than 5 digits in total.".to_string());
        }
        let whole_part: i64 =
            if significant.is_empty() { 0 } else { significant.parse().map_err(|_| invalid())? };
        let mut frac_padded = frac.to_string();
        while frac_padded.len() < 2 {
            frac_padded.push('0');
        }
        let frac_part: i64 = frac_padded.parse().map_err(|_| invalid())?;
        Self::from_hundredths(sign * (whole_part * 100 + frac_part))
    }

    fn parse_f64(v: f64) -> Result<Self, String> {
        let scaled = v * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err("Ensure that there are no more than 2 decimal places.".to_string());
        }
        Self::from_hundredths(rounded as i64)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PriceVisitor;

        impl<'de> Visitor<'de> for PriceVisitor {
            type Value = Price;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal string or number with at most 2 fraction digits")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Price, E> {
                Price::parse_str(v).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Price, E> {
                Price::parse_f64(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Price, E> {
                if v > (PRICE_MAX_HUNDREDTHS / 100) as u64 {
                    return Err(E::custom(
                        "Ensure that there are no more than 5 digits in total.",
                    ));
                }
                Price::from_hundredths((v as i64) * 100).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Price, E> {
                if v < 0 {
                    return Err(E::custom(
                        "Ensure this value is greater than or equal to 0.",
                    ));
                }
                self.visit_u64(v as u64)
            }
        }

        deserializer.deserialize_any(PriceVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: u64,
    pub name: String,
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub time_minutes: u32,
    pub price: Price,
    pub link: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<u64>,
    pub ingredients: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: Option<String>,
}

/// Tag and Ingredient share one wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedItemResponse {
    pub id: u64,
    pub name: String,
}

impl From<&Tag> for NamedItemResponse {
    fn from(tag: &Tag) -> Self {
        Self { id: tag.id, name: tag.name.clone() }
    }
}

impl From<&Ingredient> for NamedItemResponse {
    fn from(ingredient: &Ingredient) -> Self {
        Self { id: ingredient.id, name: ingredient.name.clone() }
    }
}

/// Body for create, full update, and partial update of a recipe. Which
/// fields are mandatory is decided by the handler (POST/PUT require
/// title, time_minutes, and price; PATCH requires none).
#[derive(Debug, Deserialize, Default)]
pub struct RecipeRequest {
    pub title: Option<String>,
    pub time_minutes: Option<u32>,
    pub price: Option<Price>,
    pub link: Option<String>,
    pub tags: Option<Vec<u64>>,
    pub ingredients: Option<Vec<u64>>,
}

/// List representation: associations as bare id lists.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeListItem {
    pub id: u64,
    pub title: String,
    pub time_minutes: u32,
    pub price: Price,
    pub link: Option<String>,
    pub tags: Vec<u64>,
    pub ingredients: Vec<u64>,
}

/// Detail representation: associations as nested objects.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub id: u64,
    pub title: String,
    pub time_minutes: u32,
    pub price: Price,
    pub link: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<NamedItemResponse>,
    pub ingredients: Vec<NamedItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecipeImageResponse {
    pub id: u64,
    pub image: String,
}

impl Recipe {
    pub fn to_list_item(&self) -> RecipeListItem {
        RecipeListItem {
            id: self.id,
            title: self.title.clone(),
            time_minutes: self.time_minutes,
            price: self.price,
            link: self.link.clone(),
            tags: self.tags.clone(),
            ingredients: self.ingredients.clone(),
        }
    }
}
