//! Builtin template functions.
//!
//! A registry maps function names to closures over pre-split string
//! arguments. Registration is open-ended: callers may add their own
//! functions before a run starts.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use md5::Md5;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A builtin: takes pre-split arguments, returns the substitution text
/// or a message describing why the call failed.
pub type BuiltinFn = Box<dyn Fn(&[String]) -> Result<String, String> + Send + Sync>;

/// Name → function map with the standard set pre-registered.
pub struct BuiltinRegistry {
    functions: HashMap<String, BuiltinFn>,
}

impl BuiltinRegistry {
    /// Creates a registry with the builtin set registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register("now", |_| Ok(Utc::now().to_rfc3339()));
        registry.register("timestamp", |_| Ok(Utc::now().timestamp().to_string()));
        registry.register("timestampMs", |_| {
            Ok(Utc::now().timestamp_millis().to_string())
        });
        registry.register("uuid", |_| Ok(Uuid::new_v4().to_string()));
        registry.register("random", |args| {
            let (min, max) = match args {
                [min, max] => (int_arg(min)?, int_arg(max)?),
                _ => return Err("random expects (min, max)".into()),
            };
            if min > max {
                return Err(format!("random: min {min} exceeds max {max}"));
            }
            Ok(rand::thread_rng().gen_range(min..=max).to_string())
        });
        registry.register("randomString", |args| {
            let len = len_arg(args, "randomString")?;
            let mut rng = rand::thread_rng();
            Ok((0..len)
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect())
        });
        registry.register("randomEmail", |_| {
            let mut rng = rand::thread_rng();
            let user: String = (0..10).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
            Ok(format!("{user}@example.com"))
        });
        registry.register("randomAlphanumeric", |args| {
            let len = len_arg(args, "randomAlphanumeric")?;
            const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
            let mut rng = rand::thread_rng();
            Ok((0..len)
                .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
                .collect())
        });
        registry.register("base64", |args| Ok(BASE64.encode(single_arg(args, "base64")?)));
        registry.register("base64Decode", |args| {
            let decoded = BASE64
                .decode(single_arg(args, "base64Decode")?)
                .map_err(|e| format!("base64Decode: {e}"))?;
            String::from_utf8(decoded).map_err(|e| format!("base64Decode: {e}"))
        });
        registry.register("md5", |args| {
            Ok(hex::encode(Md5::digest(single_arg(args, "md5")?)))
        });
        registry.register("sha256", |args| {
            Ok(hex::encode(Sha256::digest(single_arg(args, "sha256")?)))
        });
        registry.register("urlEncode", |args| {
            Ok(urlencoding::encode(single_arg(args, "urlEncode")?).into_owned())
        });
        registry.register("urlDecode", |args| {
            urlencoding::decode(single_arg(args, "urlDecode")?)
                .map(|s| s.into_owned())
                .map_err(|e| format!("urlDecode: {e}"))
        });
        registry.register("date", |args| {
            let format = single_arg(args, "date")?;
            Ok(Utc::now().format(format).to_string())
        });
        registry.register("json", |args| Ok(single_arg(args, "json")?.to_string()));
        registry
    }

    /// Registers (or replaces) a function under `name`.
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[String]) -> Result<String, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(function));
    }

    /// Invokes `name`, or `None` if it is not registered.
    pub fn call(&self, name: &str, args: &[String]) -> Option<Result<String, String>> {
        self.functions.get(name).map(|f| f(args))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn single_arg<'a>(args: &'a [String], name: &str) -> Result<&'a str, String> {
    match args {
        [only] => Ok(only.as_str()),
        _ => Err(format!("{name} expects one argument")),
    }
}

fn len_arg(args: &[String], name: &str) -> Result<usize, String> {
    match args {
        [len] => len
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("{name}: invalid length '{len}'")),
        _ => Err(format!("{name} expects (length)")),
    }
}

fn int_arg(s: &str) -> Result<i64, String> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid integer '{s}'"))
}

/// Splits a builtin argument list on commas outside single or double
/// quotes. Quoted arguments keep their interior verbatim.
pub fn split_args(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ',' => out.push(std::mem::take(&mut current).trim().to_string()),
                _ => current.push(c),
            },
        }
    }
    let last = current.trim().to_string();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out.retain(|a| !a.is_empty());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[&str]) -> String {
        let registry = BuiltinRegistry::with_defaults();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        registry.call(name, &args).expect("registered").expect("ok")
    }

    #[test]
    fn test_uuid_is_v4() {
        let id = call("uuid", &[]);
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_random_in_range() {
        for _ in 0..50 {
            let n: i64 = call("random", &["5", "10"]).parse().unwrap();
            assert!((5..=10).contains(&n));
        }
    }

    #[test]
    fn test_random_rejects_inverted_range() {
        let registry = BuiltinRegistry::with_defaults();
        let args = vec!["10".to_string(), "5".to_string()];
        assert!(registry.call("random", &args).unwrap().is_err());
    }

    #[test]
    fn test_random_string_length() {
        let s = call("randomString", &["12"]);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_base64_round_trip() {
        let encoded = call("base64", &["hello"]);
        assert_eq!(encoded, "aGVsbG8=");
        assert_eq!(call("base64Decode", &["aGVsbG8="]), "hello");
    }

    #[test]
    fn test_hashes() {
        assert_eq!(call("md5", &["abc"]), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            call("sha256", &["abc"]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_url_codec() {
        assert_eq!(call("urlEncode", &["a b&c"]), "a%20b%26c");
        assert_eq!(call("urlDecode", &["a%20b%26c"]), "a b&c");
    }

    #[test]
    fn test_timestamp_is_numeric() {
        let ts: i64 = call("timestamp", &[]).parse().unwrap();
        assert!(ts > 1_600_000_000);
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = BuiltinRegistry::with_defaults();
        registry.register("shout", |args| {
            Ok(args.first().map(|a| a.to_uppercase()).unwrap_or_default())
        });
        let args = vec!["hey".to_string()];
        assert_eq!(registry.call("shout", &args).unwrap().unwrap(), "HEY");
    }

    #[test]
    fn test_unknown_function_is_none() {
        let registry = BuiltinRegistry::with_defaults();
        assert!(registry.call("nope", &[]).is_none());
    }

    #[test]
    fn test_split_args_respects_quotes() {
        assert_eq!(
            split_args("a, 'b, c', \"d,e\""),
            vec!["a".to_string(), "b, c".to_string(), "d,e".to_string()]
        );
        assert!(split_args("").is_empty());
        assert_eq!(split_args("one"), vec!["one".to_string()]);
    }
}
