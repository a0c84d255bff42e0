use crate::trace::{Author, Copyright, Link, Metadata, Point, Segment, Trace, Track};
use crate::{GpxError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::path::{Path, PathBuf};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

type XmlReader<'a> = Reader<&'a [u8]>;

/// Reads and parses a GPX file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Trace> {
    let path = path.as_ref();
    let input = std::fs::read(path)?;
    let trace = parse(&input, path)?;
    tracing::info!(
        path = %path.display(),
        tracks = trace.tracks().len(),
        points = trace.point_count(),
        waypoints = trace.waypoints().len(),
        "loaded GPX trace"
    );
    Ok(trace)
}

/// Loads each file independently; a failure only affects its own entry.
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Vec<(PathBuf, Result<Trace>)> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let result = parse_file(path);
            if let Err(e) = &result {
                tracing::warn!(path = %path.display(), "failed to load GPX file: {e}");
            }
            (path.to_path_buf(), result)
        })
        .collect()
}

/// Parses the content of a GPX document. `path` is only recorded on the trace.
pub fn parse(input: &[u8], path: impl Into<PathBuf>) -> Result<Trace> {
    let mut reader = Reader::from_reader(input);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                check_root(&e)?;
                let (metadata, tracks, waypoints) = parse_gpx_children(&mut reader)?;
                return Ok(Trace::new(path, metadata, tracks, waypoints));
            }
            Ok(Event::Empty(e)) => {
                check_root(&e)?;
                return Ok(Trace::new(path, None, Vec::new(), Vec::new()));
            }
            Ok(Event::Eof) => {
                return Err(GpxError::MalformedDocument(
                    "document has no root element".to_string(),
                ));
            }
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
    }
}

fn check_root(start: &BytesStart<'_>) -> Result<()> {
    if start.local_name().as_ref() == b"gpx" {
        Ok(())
    } else {
        Err(GpxError::MalformedDocument(format!(
            "root element is <{}>, expected <gpx>",
            String::from_utf8_lossy(start.name().as_ref())
        )))
    }
}

fn xml_error(reader: &XmlReader<'_>, e: quick_xml::Error) -> GpxError {
    GpxError::MalformedDocument(format!(
        "Error at position {}: {}",
        reader.buffer_position(),
        e
    ))
}

fn unexpected_eof(element: &str) -> GpxError {
    GpxError::MalformedDocument(format!("unexpected end of document inside <{element}>"))
}

fn skip_element(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<()> {
    reader
        .read_to_end(start.name())
        .map(|_| ())
        .map_err(|e| xml_error(reader, e))
}

fn parse_gpx_children(
    reader: &mut XmlReader<'_>,
) -> Result<(Option<Metadata>, Vec<Track>, Vec<Point>)> {
    let mut metadata = None;
    let mut tracks = Vec::new();
    let mut waypoints = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"metadata" => metadata = Some(parse_metadata(reader)?),
                b"trk" => tracks.push(parse_track(reader)?),
                b"wpt" => {
                    if let Some(point) = parse_point(&e, reader)? {
                        waypoints.push(point);
                    }
                }
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"metadata" => metadata = Some(Metadata::default()),
                b"trk" => tracks.push(Track::default()),
                b"wpt" => {
                    if let Some(point) = point_from_attributes(&e) {
                        waypoints.push(point);
                    }
                }
                _ => {}
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("gpx")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok((metadata, tracks, waypoints))
}

fn parse_metadata(reader: &mut XmlReader<'_>) -> Result<Metadata> {
    let mut metadata = Metadata::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"name" => metadata.name = read_text(reader, &e)?,
                b"desc" => metadata.description = read_text(reader, &e)?,
                b"time" => {
                    metadata.time = read_text(reader, &e)?.as_deref().and_then(parse_timestamp)
                }
                b"keywords" => metadata.keywords = read_text(reader, &e)?,
                b"author" => metadata.author = Some(parse_author(reader)?),
                b"copyright" => metadata.copyright = Some(parse_copyright(&e, reader)?),
                b"link" => metadata.link = Some(parse_link(&e, reader)?),
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"author" => metadata.author = Some(Author::default()),
                b"copyright" => {
                    metadata.copyright = Some(Copyright {
                        author: attribute(&e, b"author"),
                        ..Default::default()
                    })
                }
                b"link" => {
                    metadata.link = Some(Link {
                        href: attribute(&e, b"href"),
                        ..Default::default()
                    })
                }
                _ => {}
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("metadata")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(metadata)
}

fn parse_author(reader: &mut XmlReader<'_>) -> Result<Author> {
    let mut author = Author::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"name" => author.name = read_text(reader, &e)?,
                b"email" => {
                    let text = read_text(reader, &e)?;
                    author.email = email_from_attributes(&e).or(text);
                }
                b"link" => author.link = Some(parse_link(&e, reader)?),
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"email" => author.email = email_from_attributes(&e),
                b"link" => {
                    author.link = Some(Link {
                        href: attribute(&e, b"href"),
                        ..Default::default()
                    })
                }
                _ => {}
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("author")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(author)
}

/// GPX 1.1 splits addresses into `id` and `domain` attributes.
fn email_from_attributes(start: &BytesStart<'_>) -> Option<String> {
    match (attribute(start, b"id"), attribute(start, b"domain")) {
        (Some(id), Some(domain)) => Some(format!("{id}@{domain}")),
        _ => None,
    }
}

fn parse_copyright(start: &BytesStart<'_>, reader: &mut XmlReader<'_>) -> Result<Copyright> {
    let mut copyright = Copyright {
        author: attribute(start, b"author"),
        ..Default::default()
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"year" => copyright.year = read_text(reader, &e)?,
                b"license" => copyright.license = read_text(reader, &e)?,
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("copyright")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(copyright)
}

fn parse_link(start: &BytesStart<'_>, reader: &mut XmlReader<'_>) -> Result<Link> {
    let mut link = Link {
        href: attribute(start, b"href"),
        ..Default::default()
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"text" => link.text = read_text(reader, &e)?,
                b"type" => link.link_type = read_text(reader, &e)?,
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("link")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(link)
}

fn parse_track(reader: &mut XmlReader<'_>) -> Result<Track> {
    let mut track = Track::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"name" => track.name = read_text(reader, &e)?,
                b"trkseg" => {
                    let segment = parse_segment(reader)?;
                    if segment.points.is_empty() {
                        tracing::debug!("dropping track segment without points");
                    } else {
                        track.segments.push(segment);
                    }
                }
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("trk")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(track)
}

fn parse_segment(reader: &mut XmlReader<'_>) -> Result<Segment> {
    let mut segment = Segment::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"trkpt" {
                    if let Some(point) = parse_point(&e, reader)? {
                        segment.points.push(point);
                    }
                } else {
                    skip_element(reader, &e)?;
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"trkpt"
                    && let Some(point) = point_from_attributes(&e)
                {
                    segment.points.push(point);
                }
            }
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("trkseg")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(segment)
}

/// Builds a point from the `lat`/`lon` attributes. Points without usable
/// coordinates, including ones off the globe, are dropped.
fn point_from_attributes(start: &BytesStart<'_>) -> Option<Point> {
    let lat = attribute(start, b"lat")
        .as_deref()
        .and_then(parse_decimal)
        .filter(|lat| (-90.0..=90.0).contains(lat));
    let lon = attribute(start, b"lon")
        .as_deref()
        .and_then(parse_decimal)
        .filter(|lon| (-180.0..=180.0).contains(lon));

    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Point::new(lat, lon)),
        _ => {
            tracing::debug!(
                element = %String::from_utf8_lossy(start.name().as_ref()),
                "skipping point without valid lat/lon"
            );
            None
        }
    }
}

/// Parses a `trkpt` or `wpt` element whose start tag has just been read.
fn parse_point(start: &BytesStart<'_>, reader: &mut XmlReader<'_>) -> Result<Option<Point>> {
    let Some(mut point) = point_from_attributes(start) else {
        skip_element(reader, start)?;
        return Ok(None);
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ele" => point.ele = read_text(reader, &e)?.as_deref().and_then(parse_decimal),
                b"time" => point.time = read_text(reader, &e)?.as_deref().and_then(parse_timestamp),
                b"name" => point.name = read_text(reader, &e)?,
                b"desc" => point.description = read_text(reader, &e)?,
                _ => skip_element(reader, &e)?,
            },
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(unexpected_eof("point")),
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    Ok(Some(point))
}

/// Collects the text content of the element just opened by `start`.
/// Whitespace-only or empty content yields `None`.
fn read_text(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<Option<String>> {
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::GeneralRef(e)) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    match &*e {
                        b"amp" => text.push('&'),
                        b"lt" => text.push('<'),
                        b"gt" => text.push('>'),
                        b"quot" => text.push('"'),
                        b"apos" => text.push('\''),
                        _ => {}
                    }
                }
            }
            Ok(Event::Start(e)) => skip_element(reader, &e)?,
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => {
                return Err(unexpected_eof(&String::from_utf8_lossy(
                    start.name().as_ref(),
                )));
            }
            Err(e) => return Err(xml_error(reader, e)),
            _ => {}
        }
    }

    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// Unescaped value of the attribute with the given local name. Empty values
/// count as absent.
fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| {
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .unwrap_or(raw);
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
}

/// Parses a finite float accepting either `.` or `,` as decimal separator.
pub fn parse_decimal(s: &str) -> Option<f64> {
    s.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parses an ISO 8601 timestamp into UTC. Timestamps without an offset are
/// taken to be UTC already.
pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    let parsed = OffsetDateTime::parse(s, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(s, &Iso8601::DEFAULT))
        .or_else(|_| PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).map(|t| t.assume_utc()));

    match parsed {
        Ok(t) => Some(t.to_offset(UtcOffset::UTC)),
        Err(e) => {
            tracing::debug!(value = s, "ignoring unparseable timestamp: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata>
    <name>Bay Ride</name>
    <desc>Loop around the bay</desc>
    <author>
      <name>Jane Rider</name>
      <email id="jane" domain="example.com"/>
      <link href="https://example.com/jane"><text>Jane's page</text></link>
    </author>
    <copyright author="Jane Rider">
      <year>2023</year>
      <license>https://creativecommons.org/licenses/by/4.0/</license>
    </copyright>
    <link href="https://example.com/rides/1">
      <text>Ride 1</text>
      <type>text/html</type>
    </link>
    <time>2023-01-01T09:00:00Z</time>
    <keywords>bike, bay</keywords>
  </metadata>
  <wpt lat="37.8080" lon="-122.4177">
    <name>Pier 39</name>
    <desc>Sea lions</desc>
  </wpt>
  <trk>
    <name>Test Track</name>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>100</ele>
        <time>2023-01-01T10:00:00Z</time>
        <extensions>
          <ns3:TrackPointExtension xmlns:ns3="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <ns3:hr>150</ns3:hr>
          </ns3:TrackPointExtension>
        </extensions>
      </trkpt>
      <trkpt lat="37.7750" lon="-122.4195">
        <ele>101</ele>
        <time>2023-01-01T10:00:02Z</time>
      </trkpt>
      <trkpt lat="37.7751" lon="-122.4196">
        <ele>102</ele>
        <time>2023-01-01T10:00:10Z</time>
        <name>Turn</name>
        <desc>Left at the light</desc>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    fn parse_str(xml: &str) -> Result<Trace> {
        parse(xml.as_bytes(), "sample.gpx")
    }

    /// Tests that tracks, segments and point fields are read from a full document.
    #[test]
    fn test_parse_tracks_and_points() {
        let trace = parse_str(SAMPLE_GPX).unwrap();
        assert_eq!(trace.file_path(), Path::new("sample.gpx"));
        assert_eq!(trace.tracks().len(), 1);

        let track = &trace.tracks()[0];
        assert_eq!(track.name.as_deref(), Some("Test Track"));
        assert_eq!(track.segments.len(), 1);

        let points = &track.segments[0].points;
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].lat, 37.7749);
        assert_eq!(points[0].lon, -122.4194);
        assert_eq!(points[0].ele, Some(100.0));
        assert_eq!(points[0].time, Some(datetime!(2023-01-01 10:00:00 UTC)));
        assert_eq!(points[0].name, None);
        assert_eq!(points[2].name.as_deref(), Some("Turn"));
        assert_eq!(points[2].description.as_deref(), Some("Left at the light"));
    }

    /// Tests that top-level waypoints are parsed separately from track points.
    #[test]
    fn test_parse_waypoints() {
        let trace = parse_str(SAMPLE_GPX).unwrap();
        assert_eq!(trace.waypoints().len(), 1);

        let wpt = &trace.waypoints()[0];
        assert_eq!(wpt.lat, 37.8080);
        assert_eq!(wpt.lon, -122.4177);
        assert_eq!(wpt.name.as_deref(), Some("Pier 39"));
        assert_eq!(wpt.description.as_deref(), Some("Sea lions"));
        assert_eq!(wpt.time, None);
    }

    /// Tests that every metadata field is read, including author email from id/domain.
    #[test]
    fn test_parse_metadata() {
        let trace = parse_str(SAMPLE_GPX).unwrap();
        let metadata = trace.metadata().unwrap();

        assert_eq!(metadata.name.as_deref(), Some("Bay Ride"));
        assert_eq!(metadata.description.as_deref(), Some("Loop around the bay"));
        assert_eq!(metadata.time, Some(datetime!(2023-01-01 09:00:00 UTC)));
        assert_eq!(metadata.keywords.as_deref(), Some("bike, bay"));

        let author = metadata.author.as_ref().unwrap();
        assert_eq!(author.name.as_deref(), Some("Jane Rider"));
        assert_eq!(author.email.as_deref(), Some("jane@example.com"));
        let author_link = author.link.as_ref().unwrap();
        assert_eq!(author_link.href.as_deref(), Some("https://example.com/jane"));
        assert_eq!(author_link.text.as_deref(), Some("Jane's page"));

        let copyright = metadata.copyright.as_ref().unwrap();
        assert_eq!(copyright.author.as_deref(), Some("Jane Rider"));
        assert_eq!(copyright.year.as_deref(), Some("2023"));
        assert_eq!(
            copyright.license.as_deref(),
            Some("https://creativecommons.org/licenses/by/4.0/")
        );

        let link = metadata.link.as_ref().unwrap();
        assert_eq!(link.href.as_deref(), Some("https://example.com/rides/1"));
        assert_eq!(link.text.as_deref(), Some("Ride 1"));
        assert_eq!(link.link_type.as_deref(), Some("text/html"));

        assert_eq!(trace.display_name(), "Bay Ride");
    }

    /// Tests that missing or invalid metadata fields come back as None without failing the parse.
    #[test]
    fn test_partial_metadata_degrades_gracefully() {
        let xml = r#"<gpx>
  <metadata>
    <desc></desc>
    <time>not a time</time>
    <author><email>plain@example.com</email></author>
    <copyright><year>2020</year></copyright>
    <link><text>No href</text></link>
  </metadata>
  <trk><trkseg><trkpt lat="1" lon="2"/></trkseg></trk>
</gpx>"#;
        let trace = parse_str(xml).unwrap();
        let metadata = trace.metadata().unwrap();

        assert_eq!(metadata.name, None);
        assert_eq!(metadata.description, None);
        assert_eq!(metadata.time, None);
        assert_eq!(metadata.keywords, None);

        let author = metadata.author.as_ref().unwrap();
        assert_eq!(author.name, None);
        assert_eq!(author.email.as_deref(), Some("plain@example.com"));
        assert_eq!(author.link, None);

        let copyright = metadata.copyright.as_ref().unwrap();
        assert_eq!(copyright.author, None);
        assert_eq!(copyright.year.as_deref(), Some("2020"));

        let link = metadata.link.as_ref().unwrap();
        assert_eq!(link.href, None);
        assert_eq!(link.text.as_deref(), Some("No href"));

        assert_eq!(trace.display_name(), "sample.gpx");
        assert_eq!(trace.point_count(), 1);
    }

    /// Tests that a comma decimal separator is accepted in coordinates and elevation.
    #[test]
    fn test_comma_decimal_separator() {
        let xml = r#"<gpx><trk><trkseg>
  <trkpt lat="52,5200" lon="13,4050"><ele>34,5</ele></trkpt>
</trkseg></trk></gpx>"#;
        let trace = parse_str(xml).unwrap();
        let point = &trace.tracks()[0].segments[0].points[0];
        assert_eq!(point.lat, 52.52);
        assert_eq!(point.lon, 13.405);
        assert_eq!(point.ele, Some(34.5));
    }

    /// Tests that points lacking a parseable lat or lon are dropped.
    #[test]
    fn test_points_without_coordinates_are_skipped() {
        let xml = r#"<gpx>
  <wpt lon="1.0"><name>No lat</name></wpt>
  <trk><trkseg>
    <trkpt lat="1.0"><time>2023-01-01T10:00:00Z</time></trkpt>
    <trkpt lat="abc" lon="1.0"/>
    <trkpt lat="2.0" lon="3.0"/>
  </trkseg></trk>
</gpx>"#;
        let trace = parse_str(xml).unwrap();
        assert!(trace.waypoints().is_empty());
        let points = &trace.tracks()[0].segments[0].points;
        assert_eq!(points.len(), 1);
        assert_eq!((points[0].lat, points[0].lon), (2.0, 3.0));
    }

    /// Tests that NaN, infinite and off-globe coordinates never reach the statistics.
    #[test]
    fn test_non_finite_and_out_of_range_coordinates_are_skipped() {
        let xml = r#"<gpx>
  <wpt lat="-91" lon="0"/>
  <trk><trkseg>
    <trkpt lat="0" lon="0"><time>2023-01-01T10:00:00Z</time></trkpt>
    <trkpt lat="NaN" lon="inf"><time>2023-01-01T10:00:05Z</time></trkpt>
    <trkpt lat="200" lon="1"><time>2023-01-01T10:00:10Z</time></trkpt>
    <trkpt lat="1" lon="-181"><time>2023-01-01T10:00:15Z</time></trkpt>
    <trkpt lat="infinity" lon="1"><time>2023-01-01T10:00:20Z</time></trkpt>
    <trkpt lat="90" lon="180"><ele>NaN</ele><time>2023-01-01T10:01:00Z</time></trkpt>
  </trkseg></trk>
</gpx>"#;
        let trace = parse_str(xml).unwrap();
        assert!(trace.waypoints().is_empty());
        let points = &trace.tracks()[0].segments[0].points;
        assert_eq!(points.len(), 2);
        assert_eq!((points[0].lat, points[0].lon), (0.0, 0.0));
        assert_eq!((points[1].lat, points[1].lon), (90.0, 180.0));
        assert_eq!(points[1].ele, None);

        let stats = crate::stats::TraceStatistics::new(&trace).unwrap();
        assert!(stats.distance_meters().is_finite());
        assert!(stats.average_speed().is_finite());
        assert!(stats.maximum_speed().is_finite());
        let bbox = stats.bounding_box();
        assert!((-90.0..=90.0).contains(&bbox.min_lat) && (-90.0..=90.0).contains(&bbox.max_lat));
        assert!((-180.0..=180.0).contains(&bbox.min_lon) && (-180.0..=180.0).contains(&bbox.max_lon));
    }

    /// Tests that empty or unparseable point children are treated as absent.
    #[test]
    fn test_empty_and_malformed_point_fields_are_absent() {
        let xml = r#"<gpx><trk><trkseg>
  <trkpt lat="1" lon="2">
    <ele></ele>
    <time>yesterday</time>
    <name>   </name>
    <desc/>
  </trkpt>
</trkseg></trk></gpx>"#;
        let trace = parse_str(xml).unwrap();
        let point = &trace.tracks()[0].segments[0].points[0];
        assert_eq!(point.ele, None);
        assert_eq!(point.time, None);
        assert_eq!(point.name, None);
        assert_eq!(point.description, None);
    }

    /// Tests that segments left with no points are dropped.
    #[test]
    fn test_empty_segments_are_dropped() {
        let xml = r#"<gpx><trk>
  <trkseg></trkseg>
  <trkseg><trkpt lat="1" lon="1"/></trkseg>
  <trkseg/>
  <trkseg><trkpt lon="1"/></trkseg>
</trk></gpx>"#;
        let trace = parse_str(xml).unwrap();
        assert_eq!(trace.tracks()[0].segments.len(), 1);
    }

    /// Tests that entity and character references are unescaped in text and attributes.
    #[test]
    fn test_escaped_text_and_attributes() {
        let xml = r#"<gpx><metadata>
  <name>Fish &amp; Chips &#8211; Run</name>
  <link href="https://example.com/?a=1&amp;b=2"/>
</metadata></gpx>"#;
        let trace = parse_str(xml).unwrap();
        let metadata = trace.metadata().unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Fish & Chips \u{2013} Run"));
        assert_eq!(
            metadata.link.as_ref().unwrap().href.as_deref(),
            Some("https://example.com/?a=1&b=2")
        );
    }

    /// Tests that routes and extensions are skipped without leaking nested tracks.
    #[test]
    fn test_routes_and_unknown_elements_are_ignored() {
        let xml = r#"<gpx>
  <rte><rtept lat="1" lon="1"/></rte>
  <extensions><foo><trk/></foo></extensions>
  <trk><trkseg><trkpt lat="1" lon="1"/></trkseg></trk>
</gpx>"#;
        let trace = parse_str(xml).unwrap();
        assert_eq!(trace.tracks().len(), 1);
        assert_eq!(trace.point_count(), 1);
    }

    /// Tests that a non-gpx root element is rejected as malformed.
    #[test]
    fn test_wrong_root_is_malformed() {
        let xml = r#"<?xml version="1.0"?><kml><trk/></kml>"#;
        let err = parse_str(xml).unwrap_err();
        assert!(matches!(err, GpxError::MalformedDocument(_)));
        assert!(err.to_string().contains("<kml>"));
    }

    /// Tests that empty input is malformed rather than an empty trace.
    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(
            parse(b"", "empty.gpx"),
            Err(GpxError::MalformedDocument(_))
        ));
    }

    /// Tests that mismatched closing tags are reported as malformed.
    #[test]
    fn test_mismatched_tags_are_malformed() {
        let xml = r#"<gpx><trk><trkseg></trk></gpx>"#;
        assert!(matches!(
            parse_str(xml),
            Err(GpxError::MalformedDocument(_))
        ));
    }

    /// Tests that a document cut off mid-element is malformed.
    #[test]
    fn test_truncated_document_is_malformed() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="1">"#;
        assert!(matches!(
            parse_str(xml),
            Err(GpxError::MalformedDocument(_))
        ));
    }

    /// Tests that a self-closing gpx root parses to a trace with no tracks.
    #[test]
    fn test_self_closing_root_is_an_empty_trace() {
        let trace = parse_str(r#"<gpx version="1.1"/>"#).unwrap();
        assert!(trace.tracks().is_empty());
        assert!(trace.is_empty());
    }

    /// Tests that a missing file surfaces as an IO error.
    #[test]
    fn test_parse_file_missing_is_io_error() {
        let err = parse_file("/nonexistent/dir/track.gpx").unwrap_err();
        assert!(matches!(err, GpxError::Io(_)));
    }

    /// Tests that one bad file does not stop the others from loading.
    #[test]
    fn test_load_all_isolates_failures() {
        let dir = std::env::temp_dir().join(format!("gpxtrace-load-all-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.gpx");
        let bad = dir.join("bad.gpx");
        std::fs::write(&good, SAMPLE_GPX).unwrap();
        std::fs::write(&bad, "<kml/>").unwrap();

        let results = load_all(&[&bad, &good]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, bad);
        assert!(matches!(results[0].1, Err(GpxError::MalformedDocument(_))));
        assert_eq!(results[1].0, good);
        assert_eq!(results[1].1.as_ref().unwrap().point_count(), 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    /// Tests timestamp parsing with offsets, fractions and no zone, all normalised to UTC.
    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(
            parse_timestamp("2023-01-01T10:00:00Z"),
            Some(datetime!(2023-01-01 10:00:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2023-01-01T12:00:00+02:00"),
            Some(datetime!(2023-01-01 10:00:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2023-01-01T10:00:00.500Z"),
            Some(datetime!(2023-01-01 10:00:00.5 UTC))
        );
        assert_eq!(
            parse_timestamp("2023-01-01T10:00:00"),
            Some(datetime!(2023-01-01 10:00:00 UTC))
        );
        assert_eq!(parse_timestamp("invalid-time"), None);

        let t = parse_timestamp("2023-01-01T12:00:00+02:00").unwrap();
        assert_eq!(t.offset(), UtcOffset::UTC);
    }

    /// Tests parse_decimal on separators, garbage and non-finite values.
    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1.5"), Some(1.5));
        assert_eq!(parse_decimal(" 1,5 "), Some(1.5));
        assert_eq!(parse_decimal("-122.4194"), Some(-122.4194));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("-infinity"), None);
    }

    /// Cross-checks point counts against the gpx crate on the same document.
    #[test]
    fn test_counts_match_gpx_crate() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <wpt lat="37.8080" lon="-122.4177"><name>Pier 39</name></wpt>
  <trk>
    <name>Test Track</name>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194"><time>2023-01-01T10:00:00Z</time></trkpt>
      <trkpt lat="37.7750" lon="-122.4195"><time>2023-01-01T10:00:02Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="37.7751" lon="-122.4196"><time>2023-01-01T10:00:10Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let reference: gpx::Gpx = gpx::read(xml.as_bytes()).unwrap();
        let trace = parse_str(xml).unwrap();

        assert_eq!(trace.tracks().len(), reference.tracks.len());
        assert_eq!(trace.waypoints().len(), reference.waypoints.len());
        assert_eq!(
            trace.tracks()[0].segments.len(),
            reference.tracks[0].segments.len()
        );
        for (ours, theirs) in trace.tracks()[0]
            .segments
            .iter()
            .zip(&reference.tracks[0].segments)
        {
            assert_eq!(ours.points.len(), theirs.points.len());
            for (p, q) in ours.points.iter().zip(&theirs.points) {
                assert_eq!(p.lat, q.point().y());
                assert_eq!(p.lon, q.point().x());
            }
        }
    }
}
