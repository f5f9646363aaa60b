//! Proxy IP picker: per-country colo stats and random IP selection.
//!
//! # Responsibility
//! - Map Cloudflare colo cities to countries (code, English/Chinese name, flag).
//! - Aggregate per-city IP counts into a country list.
//! - Pick at most `MAX_PROXY_IPS` IPs for a country, in random order.
//!
//! # Invariants
//! - Unknown cities never appear in the country list.
//! - Selection never returns more than `max` entries.

use crate::client::{ApiClient, ApiError};
use crate::i18n::Language;
use crate::model::deploy::count_proxy_entries;
use log::{info, warn};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Upper bound on IPs filled into the proxy field.
pub const MAX_PROXY_IPS: usize = 5;
/// Countries listed before the user asks for all of them.
pub const VISIBLE_COUNTRY_COUNT: usize = 9;
/// Default colo statistics endpoint (`{ byCity: { city: count } }`).
pub const DEFAULT_STATS_URL: &str = "https://bestip.06151953.xyz/api/stats";
/// Default per-country IP endpoint; the country code is appended as a path segment.
pub const DEFAULT_IP_URL: &str = "https://bestip.06151953.xyz/country";

/// Countries offered when the stats endpoint is unreachable.
const FALLBACK_COUNTRY_CODES: [&str; 5] = ["US", "JP", "GB", "DE", "SG"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryInfo {
    pub code: &'static str,
    pub name_en: &'static str,
    pub name_zh: &'static str,
    pub flag: &'static str,
}

impl CountryInfo {
    pub fn name(&self, lang: Language) -> &'static str {
        match lang {
            Language::En => self.name_en,
            Language::Zh => self.name_zh,
        }
    }
}

const fn country(
    code: &'static str,
    name_en: &'static str,
    name_zh: &'static str,
    flag: &'static str,
) -> CountryInfo {
    CountryInfo {
        code,
        name_en,
        name_zh,
        flag,
    }
}

const COUNTRIES: &[CountryInfo] = &[
    country("AM", "Armenia", "亚美尼亚", "🇦🇲"),
    country("AR", "Argentina", "阿根廷", "🇦🇷"),
    country("AT", "Austria", "奥地利", "🇦🇹"),
    country("AU", "Australia", "澳大利亚", "🇦🇺"),
    country("BG", "Bulgaria", "保加利亚", "🇧🇬"),
    country("BR", "Brazil", "巴西", "🇧🇷"),
    country("CA", "Canada", "加拿大", "🇨🇦"),
    country("CH", "Switzerland", "瑞士", "🇨🇭"),
    country("CO", "Colombia", "哥伦比亚", "🇨🇴"),
    country("CY", "Cyprus", "塞浦路斯", "🇨🇾"),
    country("CZ", "Czechia", "捷克", "🇨🇿"),
    country("DE", "Germany", "德国", "🇩🇪"),
    country("DK", "Denmark", "丹麦", "🇩🇰"),
    country("EE", "Estonia", "爱沙尼亚", "🇪🇪"),
    country("ES", "Spain", "西班牙", "🇪🇸"),
    country("FI", "Finland", "芬兰", "🇫🇮"),
    country("FR", "France", "法国", "🇫🇷"),
    country("GB", "United Kingdom", "英国", "🇬🇧"),
    country("HK", "Hong Kong", "香港", "🇭🇰"),
    country("HU", "Hungary", "匈牙利", "🇭🇺"),
    country("ID", "Indonesia", "印度尼西亚", "🇮🇩"),
    country("IE", "Ireland", "爱尔兰", "🇮🇪"),
    country("IL", "Israel", "以色列", "🇮🇱"),
    country("IN", "India", "印度", "🇮🇳"),
    country("IT", "Italy", "意大利", "🇮🇹"),
    country("JP", "Japan", "日本", "🇯🇵"),
    country("KR", "South Korea", "韩国", "🇰🇷"),
    country("KZ", "Kazakhstan", "哈萨克斯坦", "🇰🇿"),
    country("LT", "Lithuania", "立陶宛", "🇱🇹"),
    country("LV", "Latvia", "拉脱维亚", "🇱🇻"),
    country("MD", "Moldova", "摩尔多瓦", "🇲🇩"),
    country("NL", "Netherlands", "荷兰", "🇳🇱"),
    country("NO", "Norway", "挪威", "🇳🇴"),
    country("NZ", "New Zealand", "新西兰", "🇳🇿"),
    country("OM", "Oman", "阿曼", "🇴🇲"),
    country("PL", "Poland", "波兰", "🇵🇱"),
    country("RO", "Romania", "罗马尼亚", "🇷🇴"),
    country("RU", "Russia", "俄罗斯", "🇷🇺"),
    country("SE", "Sweden", "瑞典", "🇸🇪"),
    country("SG", "Singapore", "新加坡", "🇸🇬"),
    country("SK", "Slovakia", "斯洛伐克", "🇸🇰"),
    country("TH", "Thailand", "泰国", "🇹🇭"),
    country("TR", "Turkey", "土耳其", "🇹🇷"),
    country("TW", "Taiwan", "台湾", "🇹🇼"),
    country("UA", "Ukraine", "乌克兰", "🇺🇦"),
    country("US", "United States", "美国", "🇺🇸"),
];

/// Colo city -> ISO country code.
const CITY_COUNTRY_CODES: &[(&str, &str)] = &[
    // Europe
    ("Frankfurt", "DE"),
    ("Amsterdam", "NL"),
    ("Paris", "FR"),
    ("Stockholm", "SE"),
    ("Helsinki", "FI"),
    ("Warsaw", "PL"),
    ("London", "GB"),
    ("Vilnius", "LT"),
    ("Istanbul", "TR"),
    ("Madrid", "ES"),
    ("Zurich", "CH"),
    ("Hamburg", "DE"),
    ("Riga", "LV"),
    ("Copenhagen", "DK"),
    ("Bucharest", "RO"),
    ("Vienna", "AT"),
    ("Milan", "IT"),
    ("Oslo", "NO"),
    ("Sofia", "BG"),
    ("Tallinn", "EE"),
    ("Moscow", "RU"),
    ("Lyon", "FR"),
    ("Chișinău", "MD"),
    ("Rome", "IT"),
    ("Budapest", "HU"),
    ("Dublin", "IE"),
    ("Marseille", "FR"),
    ("Kyiv", "UA"),
    ("Düsseldorf", "DE"),
    ("Saint Petersburg", "RU"),
    ("Geneva", "CH"),
    ("Manchester", "GB"),
    ("Berlin", "DE"),
    ("Prague", "CZ"),
    ("Palermo", "IT"),
    ("Nicosia", "CY"),
    ("Bratislava", "SK"),
    ("Munich", "DE"),
    // Asia-Pacific
    ("Seoul", "KR"),
    ("Singapore", "SG"),
    ("Tokyo", "JP"),
    ("Hong Kong", "HK"),
    ("Fukuoka", "JP"),
    ("Osaka", "JP"),
    ("Mumbai", "IN"),
    ("Taipei", "TW"),
    ("Yerevan", "AM"),
    ("Bangkok", "TH"),
    ("Chennai", "IN"),
    ("Bangalore", "IN"),
    ("Jakarta", "ID"),
    ("Kaohsiung City", "TW"),
    ("Almaty", "KZ"),
    ("Muscat", "OM"),
    ("Hyderabad", "IN"),
    ("Tel Aviv", "IL"),
    ("Haifa", "IL"),
    ("Aktobe", "KZ"),
    // North America
    ("Los Angeles", "US"),
    ("San Jose", "US"),
    ("Ashburn", "US"),
    ("Toronto", "CA"),
    ("Seattle", "US"),
    ("Portland", "US"),
    ("Newark", "US"),
    ("Miami", "US"),
    ("Dallas", "US"),
    ("Buffalo", "US"),
    ("Atlanta", "US"),
    ("Denver", "US"),
    ("Montréal", "CA"),
    ("Chicago", "US"),
    ("Norfolk", "US"),
    ("Phoenix", "US"),
    ("Kansas City", "US"),
    ("Columbus", "US"),
    ("Vancouver", "CA"),
    // Oceania
    ("Sydney", "AU"),
    ("Melbourne", "AU"),
    ("Auckland", "NZ"),
    // South America
    ("São Paulo", "BR"),
    ("Bogota", "CO"),
    ("Buenos Aires", "AR"),
];

static COUNTRY_BY_CODE: Lazy<HashMap<&'static str, &'static CountryInfo>> =
    Lazy::new(|| COUNTRIES.iter().map(|info| (info.code, info)).collect());

static COUNTRY_BY_CITY: Lazy<HashMap<&'static str, &'static CountryInfo>> = Lazy::new(|| {
    CITY_COUNTRY_CODES
        .iter()
        .filter_map(|(city, code)| COUNTRY_BY_CODE.get(code).map(|info| (*city, *info)))
        .collect()
});

pub fn country_info(code: &str) -> Option<&'static CountryInfo> {
    COUNTRY_BY_CODE
        .get(code.trim().to_ascii_uppercase().as_str())
        .copied()
}

pub fn country_for_city(city: &str) -> Option<&'static CountryInfo> {
    COUNTRY_BY_CITY.get(city).copied()
}

/// One selectable country with the number of known IPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryOption {
    pub country: &'static CountryInfo,
    pub count: u64,
}

impl CountryOption {
    pub fn code(&self) -> &'static str {
        self.country.code
    }

    /// `<flag> <name>` in `lang`.
    pub fn label(&self, lang: Language) -> String {
        format!("{} {}", self.country.flag, self.country.name(lang))
    }
}

/// Stats endpoint payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColoStats {
    #[serde(rename = "byCity", default)]
    pub by_city: BTreeMap<String, u64>,
}

/// One IP from the per-country endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyIpEntry {
    pub ip: String,
    pub port: u16,
}

impl Display for ProxyIpEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Sums city counts per country, most IPs first (ties by code).
pub fn aggregate_countries(by_city: &BTreeMap<String, u64>) -> Vec<CountryOption> {
    let mut totals: BTreeMap<&'static str, CountryOption> = BTreeMap::new();
    for (city, count) in by_city {
        let Some(country) = country_for_city(city) else {
            continue;
        };
        totals
            .entry(country.code)
            .or_insert(CountryOption { country, count: 0 })
            .count += count;
    }

    let mut options: Vec<_> = totals.into_values().collect();
    options.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code().cmp(b.code())));
    options
}

/// US, JP, GB, DE, SG with zero counts.
pub fn fallback_countries() -> Vec<CountryOption> {
    FALLBACK_COUNTRY_CODES
        .iter()
        .filter_map(|code| country_info(code))
        .map(|country| CountryOption { country, count: 0 })
        .collect()
}

/// Keeps at most `max` entries (shuffled when trimming), as `ip:port,ip:port`.
pub fn select_proxy_ips(entries: Vec<ProxyIpEntry>, max: usize) -> String {
    select_proxy_ips_with(entries, max, &mut rand::thread_rng())
}

pub fn select_proxy_ips_with<R: Rng + ?Sized>(
    mut entries: Vec<ProxyIpEntry>,
    max: usize,
    rng: &mut R,
) -> String {
    if entries.len() > max {
        entries.shuffle(rng);
        entries.truncate(max);
    }
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of non-blank entries in a proxy IP field.
pub fn count_proxy_ips(value: &str) -> usize {
    count_proxy_entries(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyIpError {
    InvalidCountryCode(String),
    Request(ApiError),
}

impl Display for ProxyIpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCountryCode(code) => {
                write!(f, "invalid country code `{code}`; expected two letters")
            }
            Self::Request(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProxyIpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Request(err) => Some(err),
            Self::InvalidCountryCode(_) => None,
        }
    }
}

impl From<ApiError> for ProxyIpError {
    fn from(value: ApiError) -> Self {
        Self::Request(value)
    }
}

/// HTTP access to the colo stats and per-country IP endpoints.
pub struct ProxyIpClient<'c> {
    client: &'c ApiClient,
    stats_url: String,
    ip_url: String,
}

impl<'c> ProxyIpClient<'c> {
    pub fn new(client: &'c ApiClient, stats_url: &str, ip_url: &str) -> Self {
        Self {
            client,
            stats_url: stats_url.trim().to_string(),
            ip_url: ip_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn fetch_countries(&self) -> Result<Vec<CountryOption>, ProxyIpError> {
        let stats: ColoStats = self.client.get(&self.stats_url)?;
        let options = aggregate_countries(&stats.by_city);
        info!(
            "event=fetch_countries module=proxy_ip status=ok cities={} countries={}",
            stats.by_city.len(),
            options.len()
        );
        Ok(options)
    }

    /// Countries from one stats request. On failure: the fallback list and the error.
    pub fn fetch_countries_or_fallback(&self) -> (Vec<CountryOption>, Option<ProxyIpError>) {
        match self.fetch_countries() {
            Ok(options) => (options, None),
            Err(err) => {
                warn!("event=fetch_countries module=proxy_ip status=error fallback=true error={err}");
                (fallback_countries(), Some(err))
            }
        }
    }

    pub fn fetch_ips(&self, country_code: &str) -> Result<Vec<ProxyIpEntry>, ProxyIpError> {
        let code = normalize_country_code(country_code)?;
        let entries: Vec<ProxyIpEntry> = self.client.get(&format!("{}/{code}", self.ip_url))?;
        info!(
            "event=fetch_ips module=proxy_ip status=ok country={code} count={}",
            entries.len()
        );
        Ok(entries)
    }
}

fn normalize_country_code(code: &str) -> Result<String, ProxyIpError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(ProxyIpError::InvalidCountryCode(code))
    }
}
