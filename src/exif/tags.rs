//! Tag name tables and the write whitelist.
//!
//! IFD0 and IFD1 share the baseline TIFF table. Tags missing from a table are
//! reported as `0xNNNN` so nothing read from a file is dropped for lack of a
//! name.

use crate::types::Section;

use super::encoding::TagEncoding;

const IMAGE_TAGS: &[(u16, &str)] = &[
    (0x00FE, "NewSubfileType"),
    (0x0100, "ImageWidth"),
    (0x0101, "ImageLength"),
    (0x0102, "BitsPerSample"),
    (0x0103, "Compression"),
    (0x0106, "PhotometricInterpretation"),
    (0x010E, "ImageDescription"),
    (0x010F, "Make"),
    (0x0110, "Model"),
    (0x0111, "StripOffsets"),
    (0x0112, "Orientation"),
    (0x0115, "SamplesPerPixel"),
    (0x0116, "RowsPerStrip"),
    (0x0117, "StripByteCounts"),
    (0x011A, "XResolution"),
    (0x011B, "YResolution"),
    (0x011C, "PlanarConfiguration"),
    (0x0128, "ResolutionUnit"),
    (0x012D, "TransferFunction"),
    (0x0131, "Software"),
    (0x0132, "DateTime"),
    (0x013B, "Artist"),
    (0x013E, "WhitePoint"),
    (0x013F, "PrimaryChromaticities"),
    (0x0201, "JPEGInterchangeFormat"),
    (0x0202, "JPEGInterchangeFormatLength"),
    (0x0211, "YCbCrCoefficients"),
    (0x0212, "YCbCrSubSampling"),
    (0x0213, "YCbCrPositioning"),
    (0x0214, "ReferenceBlackWhite"),
    (0x02BC, "XMLPacket"),
    (0x4746, "Rating"),
    (0x4749, "RatingPercent"),
    (0x8298, "Copyright"),
    (0x83BB, "IPTCNAA"),
    (0x8649, "ImageResources"),
    (0x8769, "ExifTag"),
    (0x8825, "GPSTag"),
    (0x9C9B, "XPTitle"),
    (0x9C9C, "XPComment"),
    (0x9C9D, "XPAuthor"),
    (0x9C9E, "XPKeywords"),
    (0x9C9F, "XPSubject"),
    (0xC4A5, "PrintImageMatching"),
];

const EXIF_TAGS: &[(u16, &str)] = &[
    (0x829A, "ExposureTime"),
    (0x829D, "FNumber"),
    (0x8822, "ExposureProgram"),
    (0x8824, "SpectralSensitivity"),
    (0x8827, "ISOSpeedRatings"),
    (0x8828, "OECF"),
    (0x8830, "SensitivityType"),
    (0x8832, "RecommendedExposureIndex"),
    (0x9000, "ExifVersion"),
    (0x9003, "DateTimeOriginal"),
    (0x9004, "DateTimeDigitized"),
    (0x9010, "OffsetTime"),
    (0x9011, "OffsetTimeOriginal"),
    (0x9012, "OffsetTimeDigitized"),
    (0x9101, "ComponentsConfiguration"),
    (0x9102, "CompressedBitsPerPixel"),
    (0x9201, "ShutterSpeedValue"),
    (0x9202, "ApertureValue"),
    (0x9203, "BrightnessValue"),
    (0x9204, "ExposureBiasValue"),
    (0x9205, "MaxApertureValue"),
    (0x9206, "SubjectDistance"),
    (0x9207, "MeteringMode"),
    (0x9208, "LightSource"),
    (0x9209, "Flash"),
    (0x920A, "FocalLength"),
    (0x9214, "SubjectArea"),
    (0x927C, "MakerNote"),
    (0x9286, "UserComment"),
    (0x9290, "SubSecTime"),
    (0x9291, "SubSecTimeOriginal"),
    (0x9292, "SubSecTimeDigitized"),
    (0xA000, "FlashpixVersion"),
    (0xA001, "ColorSpace"),
    (0xA002, "PixelXDimension"),
    (0xA003, "PixelYDimension"),
    (0xA004, "RelatedSoundFile"),
    (0xA005, "InteroperabilityTag"),
    (0xA20B, "FlashEnergy"),
    (0xA20E, "FocalPlaneXResolution"),
    (0xA20F, "FocalPlaneYResolution"),
    (0xA210, "FocalPlaneResolutionUnit"),
    (0xA214, "SubjectLocation"),
    (0xA215, "ExposureIndex"),
    (0xA217, "SensingMethod"),
    (0xA300, "FileSource"),
    (0xA301, "SceneType"),
    (0xA302, "CFAPattern"),
    (0xA401, "CustomRendered"),
    (0xA402, "ExposureMode"),
    (0xA403, "WhiteBalance"),
    (0xA404, "DigitalZoomRatio"),
    (0xA405, "FocalLengthIn35mmFilm"),
    (0xA406, "SceneCaptureType"),
    (0xA407, "GainControl"),
    (0xA408, "Contrast"),
    (0xA409, "Saturation"),
    (0xA40A, "Sharpness"),
    (0xA40C, "SubjectDistanceRange"),
    (0xA420, "ImageUniqueID"),
    (0xA430, "CameraOwnerName"),
    (0xA431, "BodySerialNumber"),
    (0xA432, "LensSpecification"),
    (0xA433, "LensMake"),
    (0xA434, "LensModel"),
    (0xA435, "LensSerialNumber"),
];

const GPS_TAGS: &[(u16, &str)] = &[
    (0x0000, "GPSVersionID"),
    (0x0001, "GPSLatitudeRef"),
    (0x0002, "GPSLatitude"),
    (0x0003, "GPSLongitudeRef"),
    (0x0004, "GPSLongitude"),
    (0x0005, "GPSAltitudeRef"),
    (0x0006, "GPSAltitude"),
    (0x0007, "GPSTimeStamp"),
    (0x0008, "GPSSatellites"),
    (0x0009, "GPSStatus"),
    (0x000A, "GPSMeasureMode"),
    (0x000B, "GPSDOP"),
    (0x000C, "GPSSpeedRef"),
    (0x000D, "GPSSpeed"),
    (0x000E, "GPSTrackRef"),
    (0x000F, "GPSTrack"),
    (0x0010, "GPSImgDirectionRef"),
    (0x0011, "GPSImgDirection"),
    (0x0012, "GPSMapDatum"),
    (0x0013, "GPSDestLatitudeRef"),
    (0x0014, "GPSDestLatitude"),
    (0x0015, "GPSDestLongitudeRef"),
    (0x0016, "GPSDestLongitude"),
    (0x0017, "GPSDestBearingRef"),
    (0x0018, "GPSDestBearing"),
    (0x0019, "GPSDestDistanceRef"),
    (0x001A, "GPSDestDistance"),
    (0x001B, "GPSProcessingMethod"),
    (0x001C, "GPSAreaInformation"),
    (0x001D, "GPSDateStamp"),
    (0x001E, "GPSDifferential"),
    (0x001F, "GPSHPositioningError"),
];

const INTEROP_TAGS: &[(u16, &str)] = &[
    (0x0001, "InteroperabilityIndex"),
    (0x0002, "InteroperabilityVersion"),
    (0x1000, "RelatedImageFileFormat"),
    (0x1001, "RelatedImageWidth"),
    (0x1002, "RelatedImageLength"),
];

fn table(section: Section) -> &'static [(u16, &'static str)] {
    match section {
        Section::Image | Section::Thumbnail => IMAGE_TAGS,
        Section::Exif => EXIF_TAGS,
        Section::Gps => GPS_TAGS,
        Section::Interop => INTEROP_TAGS,
    }
}

/// Symbolic name for `tag` in `section`, or `0xNNNN`.
pub fn tag_name(section: Section, tag: u16) -> String {
    table(section)
        .iter()
        .find(|(id, _)| *id == tag)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("0x{tag:04X}"))
}

/// GPS coordinate tags and the `*Ref` tag that carries their hemisphere.
pub const GPS_COORDINATES: &[(u16, u16)] = &[
    (0x0002, 0x0001),
    (0x0004, 0x0003),
    (0x0014, 0x0013),
    (0x0016, 0x0015),
];

/// Text tags whose values are lists by convention (`;`-separated keywords).
pub fn is_list_like(section: Section, tag: u16) -> bool {
    matches!(section, Section::Image | Section::Thumbnail) && matches!(tag, 0x9C9E | 0x9C9F)
}

/// A tag the writer accepts by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritableTag {
    pub name: &'static str,
    pub section: Section,
    pub tag: u16,
    pub encoding: TagEncoding,
}

const fn writable(name: &'static str, section: Section, tag: u16, encoding: TagEncoding) -> WritableTag {
    WritableTag {
        name,
        section,
        tag,
        encoding,
    }
}

/// Everything else is rejected with `UnsupportedTag`.
pub const WRITABLE_TAGS: &[WritableTag] = &[
    writable("Artist", Section::Image, 0x013B, TagEncoding::Utf8),
    writable("Copyright", Section::Image, 0x8298, TagEncoding::Utf8),
    writable("ImageDescription", Section::Image, 0x010E, TagEncoding::Utf8),
    writable("Software", Section::Image, 0x0131, TagEncoding::Utf8),
    writable("DateTime", Section::Image, 0x0132, TagEncoding::Utf8),
    writable("Make", Section::Image, 0x010F, TagEncoding::Utf8),
    writable("Model", Section::Image, 0x0110, TagEncoding::Utf8),
    writable("XPTitle", Section::Image, 0x9C9B, TagEncoding::Utf16Xp),
    writable("XPComment", Section::Image, 0x9C9C, TagEncoding::Utf16Xp),
    writable("XPAuthor", Section::Image, 0x9C9D, TagEncoding::Utf16Xp),
    writable("XPKeywords", Section::Image, 0x9C9E, TagEncoding::Utf16Xp),
    writable("XPSubject", Section::Image, 0x9C9F, TagEncoding::Utf16Xp),
    writable("DateTimeOriginal", Section::Exif, 0x9003, TagEncoding::Utf8),
    writable("DateTimeDigitized", Section::Exif, 0x9004, TagEncoding::Utf8),
    writable("UserComment", Section::Exif, 0x9286, TagEncoding::UserComment),
    writable("CameraOwnerName", Section::Exif, 0xA430, TagEncoding::Utf8),
];

pub fn writable_tag(name: &str) -> Option<&'static WritableTag> {
    WRITABLE_TAGS.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_names() {
        assert_eq!(tag_name(Section::Image, 0x010F), "Make");
        assert_eq!(tag_name(Section::Thumbnail, 0x0103), "Compression");
        assert_eq!(tag_name(Section::Gps, 0x0002), "GPSLatitude");
        assert_eq!(tag_name(Section::Exif, 0xBEEF), "0xBEEF");
        assert_eq!(tag_name(Section::Interop, 0x0005), "0x0005");
    }

    #[test]
    fn same_id_differs_by_section() {
        assert_eq!(tag_name(Section::Gps, 0x0001), "GPSLatitudeRef");
        assert_eq!(tag_name(Section::Interop, 0x0001), "InteroperabilityIndex");
    }

    #[test]
    fn whitelist_lookup() {
        let tag = writable_tag("UserComment").unwrap();
        assert_eq!(tag.section, Section::Exif);
        assert_eq!(tag.encoding, TagEncoding::UserComment);
        assert!(writable_tag("FNumber").is_none());
        assert!(writable_tag("artist").is_none());
    }

    #[test]
    fn whitelist_names_match_name_tables() {
        for t in WRITABLE_TAGS {
            assert_eq!(tag_name(t.section, t.tag), t.name);
        }
    }

    #[test]
    fn keywords_are_list_like() {
        assert!(is_list_like(Section::Image, 0x9C9E));
        assert!(!is_list_like(Section::Image, 0x010E));
        assert!(!is_list_like(Section::Gps, 0x9C9E));
    }
}
