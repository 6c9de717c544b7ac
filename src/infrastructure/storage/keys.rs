//! Object key layout shared with the transcoding worker and the CDN.

use uuid::Uuid;

pub const SOURCE_PREFIX: &str = "source/";
pub const JOBS_PREFIX: &str = "jobs/";
pub const LEASES_PREFIX: &str = "leases/";
pub const TRANSCODED_PREFIX: &str = "transcoded/";
pub const MANIFEST_NAME: &str = "index.m3u8";

pub fn source_key(id: Uuid, file_name: &str) -> String {
    format!("{}{}/{}", SOURCE_PREFIX, id, file_name)
}

pub fn job_key(id: Uuid) -> String {
    format!("{}{}.json", JOBS_PREFIX, id)
}

pub fn lease_key(id: Uuid) -> String {
    format!("{}{}.json", LEASES_PREFIX, id)
}

pub fn transcoded_key(id: Uuid, name: &str) -> String {
    format!("{}{}/{}", TRANSCODED_PREFIX, id, name)
}

pub fn manifest_key(id: Uuid) -> String {
    transcoded_key(id, MANIFEST_NAME)
}

/// Recovers the video id from a `jobs/{id}.json` key.
pub fn video_id_from_job_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(JOBS_PREFIX)?
        .strip_suffix(".json")
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_worker_layout() {
        let id = Uuid::parse_str("7f8f3c2e-2b8e-4a4e-9c55-0a0c1d2e3f40").unwrap();
        assert_eq!(source_key(id, "clip.mp4"), format!("source/{}/clip.mp4", id));
        assert_eq!(job_key(id), format!("jobs/{}.json", id));
        assert_eq!(manifest_key(id), format!("transcoded/{}/index.m3u8", id));
        assert_eq!(video_id_from_job_key(&job_key(id)), Some(id));
    }

    #[test]
    fn foreign_job_keys_are_ignored() {
        assert_eq!(video_id_from_job_key("jobs/readme.txt"), None);
        assert_eq!(video_id_from_job_key("jobs/not-a-uuid.json"), None);
        assert_eq!(video_id_from_job_key("leases/whatever.json"), None);
    }
}
