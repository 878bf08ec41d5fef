// Test fixtures: assembles XDF byte streams chunk by chunk

pub(crate) struct XdfBuilder {
    bytes: Vec<u8>,
}

type Row<T> = (Option<f64>, Vec<T>);

impl XdfBuilder {
    pub fn new() -> Self {
        XdfBuilder {
            bytes: b"XDF:".to_vec(),
        }
    }

    /// Raw chunk; the length covers the tag and content
    pub fn chunk(mut self, tag: u16, content: &[u8]) -> Self {
        let length = content.len() + 2;
        if length <= u8::MAX as usize {
            self.bytes.push(1);
            self.bytes.push(length as u8);
        } else {
            self.bytes.push(4);
            self.bytes.extend_from_slice(&(length as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(&tag.to_le_bytes());
        self.bytes.extend_from_slice(content);
        self
    }

    pub fn file_header(self) -> Self {
        self.chunk(
            1,
            b"<?xml version=\"1.0\"?><info><version>1.0</version></info>",
        )
    }

    pub fn stream_header(
        self,
        id: u32,
        name: &str,
        channel_count: usize,
        nominal_srate: f64,
        channel_format: &str,
    ) -> Self {
        let xml = format!(
            "<?xml version=\"1.0\"?><info><name>{}</name><type>Test</type>\
             <channel_count>{}</channel_count><nominal_srate>{}</nominal_srate>\
             <channel_format>{}</channel_format></info>",
            name, channel_count, nominal_srate, channel_format
        );
        let mut content = id.to_le_bytes().to_vec();
        content.extend_from_slice(xml.as_bytes());
        self.chunk(2, &content)
    }

    fn samples_with<T>(self, id: u32, rows: &[Row<T>], encode: impl Fn(&T, &mut Vec<u8>)) -> Self {
        let mut content = id.to_le_bytes().to_vec();
        content.push(4);
        content.extend_from_slice(&(rows.len() as u32).to_le_bytes());

        for (timestamp, values) in rows {
            match timestamp {
                Some(t) => {
                    content.push(8);
                    content.extend_from_slice(&t.to_le_bytes());
                }
                None => content.push(0),
            }
            for v in values {
                encode(v, &mut content);
            }
        }
        self.chunk(3, &content)
    }

    pub fn samples_f64(self, id: u32, rows: &[Row<f64>]) -> Self {
        self.samples_with(id, rows, |v, out| out.extend_from_slice(&v.to_le_bytes()))
    }

    pub fn samples_f32(self, id: u32, rows: &[Row<f64>]) -> Self {
        self.samples_with(id, rows, |v, out| {
            out.extend_from_slice(&(*v as f32).to_le_bytes())
        })
    }

    pub fn samples_i16(self, id: u32, rows: &[Row<i16>]) -> Self {
        self.samples_with(id, rows, |v, out| out.extend_from_slice(&v.to_le_bytes()))
    }

    pub fn samples_str(self, id: u32, rows: &[Row<&str>]) -> Self {
        self.samples_with(id, rows, |v, out| {
            out.push(1);
            out.push(v.len() as u8);
            out.extend_from_slice(v.as_bytes());
        })
    }

    pub fn clock_offset(self, id: u32, collection_time: f64, offset: f64) -> Self {
        let mut content = id.to_le_bytes().to_vec();
        content.extend_from_slice(&collection_time.to_le_bytes());
        content.extend_from_slice(&offset.to_le_bytes());
        self.chunk(4, &content)
    }

    pub fn boundary(self) -> Self {
        self.chunk(5, &[0x43; 16])
    }

    pub fn footer(self, id: u32, xml: &str) -> Self {
        let mut content = id.to_le_bytes().to_vec();
        content.extend_from_slice(xml.as_bytes());
        self.chunk(6, &content)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Recording with reference stream `a` (ts 0,1,2 / 1,2,3) and stream `b` (ts 0,2 / 10,30)
pub(crate) fn two_stream_xdf(a: &str, b: &str) -> Vec<u8> {
    XdfBuilder::new()
        .file_header()
        .stream_header(1, a, 1, 0.0, "double64")
        .stream_header(2, b, 1, 0.0, "double64")
        .samples_f64(
            1,
            &[
                (Some(0.0), vec![1.0]),
                (Some(1.0), vec![2.0]),
                (Some(2.0), vec![3.0]),
            ],
        )
        .samples_f64(2, &[(Some(0.0), vec![10.0]), (Some(2.0), vec![30.0])])
        .build()
}
